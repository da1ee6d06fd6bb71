//! Client facing view of manifest periods.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use crate::{
    dash::{mime::ContentType, AdaptationSet, Format, Period},
    DashError, DashResult,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub format: Format,
}

/// One adaptation set as the client sees it: interchangeable streams of one content type.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamGroup {
    pub content_type: ContentType,
    pub streams: Vec<StreamInfo>,
}

impl StreamGroup {
    fn from_adaptation_set(adaptation_set: &AdaptationSet) -> Self {
        Self {
            content_type: adaptation_set.content_type,
            streams: adaptation_set
                .representations
                .iter()
                .map(|r| StreamInfo {
                    format: r.format.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPeriod {
    pub id: usize,
    pub start: Option<Duration>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub periods: Vec<ClientPeriod>,
    pub dynamic: bool,
}

#[derive(Debug)]
struct PeriodState {
    period: Arc<Period>,
    stream_groups: Vec<StreamGroup>,
}

/// A manifest period with a client id that stays stable across manifest refreshes.
///
/// The provider hands out `Arc<DashPeriod>` and updates the same instance in place
/// whenever a refreshed manifest still contains the period.
#[derive(Debug)]
pub struct DashPeriod {
    id: usize,
    state: RwLock<PeriodState>,
}

impl DashPeriod {
    pub(crate) fn new(id: usize, period: Arc<Period>) -> Self {
        Self {
            id,
            state: RwLock::new(Self::build(period)),
        }
    }

    fn build(period: Arc<Period>) -> PeriodState {
        let stream_groups = period
            .adaptation_sets
            .iter()
            .map(|a| StreamGroup::from_adaptation_set(a))
            .collect();
        PeriodState {
            period,
            stream_groups,
        }
    }

    pub(crate) fn update(&self, period: Arc<Period>) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Self::build(period);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn period(&self) -> Arc<Period> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .period
            .clone()
    }

    pub fn stream_groups(&self) -> Vec<StreamGroup> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .stream_groups
            .clone()
    }

    /// The adaptation set behind `group`.
    pub fn adaptation_set(&self, group: &StreamGroup) -> DashResult<Arc<AdaptationSet>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let index = state
            .stream_groups
            .iter()
            .position(|g| g == group)
            .ok_or(DashError::InvalidStreamGroup)?;
        Ok(state.period.adaptation_sets[index].clone())
    }

    pub fn select_streams(&self, groups: &[StreamGroup]) -> DashResult<Vec<Arc<AdaptationSet>>> {
        groups.iter().map(|g| self.adaptation_set(g)).collect()
    }
}
