/// A byte range inside a remote resource.
///
/// `length == None` means "until the end of the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// First byte after the range, when the length is known.
    pub fn end(&self) -> Option<u64> {
        self.length.map(|length| self.offset + length)
    }

    /// Value for the HTTP `Range` header, `None` when the range covers the whole resource.
    pub fn to_http_range(&self) -> Option<String> {
        match self.length {
            Some(0) => None,
            Some(length) => Some(format!(
                "bytes={}-{}",
                self.offset,
                self.offset + length - 1
            )),
            None if self.offset > 0 => Some(format!("bytes={}-", self.offset)),
            None => None,
        }
    }
}
