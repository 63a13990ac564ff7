use crate::domain::BoardDescriptor;

/// Board metadata as reported by a site's board list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChanBoard {
    pub descriptor: BoardDescriptor,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub work_safe: bool,
    pub page_count: u32,
    pub threads_per_page: u32,
    pub bump_limit: Option<u32>,
}

impl ChanBoard {
    pub fn new(descriptor: BoardDescriptor, name: impl Into<String>) -> Self {
        Self {
            descriptor,
            name: name.into(),
            description: None,
            active: true,
            work_safe: false,
            page_count: 10,
            threads_per_page: 15,
            bump_limit: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.descriptor.board_code
    }
}
