use crate::domain::{BoardDescriptor, ThreadDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadNoTimeModPair {
    pub thread: ThreadDescriptor,
    pub modified: i64,
}

/// One page of a board's thread index.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardPage {
    pub current_page: u32,
    pub total_pages: u32,
    pub threads: Vec<ThreadNoTimeModPair>,
}

impl BoardPage {
    pub fn is_on_last_page(&self) -> bool {
        self.current_page >= self.total_pages
    }

    pub fn contains(&self, thread_no: u64) -> bool {
        self.threads.iter().any(|pair| pair.thread.thread_no == thread_no)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardPages {
    pub board: BoardDescriptor,
    pub pages: Vec<BoardPage>,
}

impl BoardPages {
    pub fn find_page(&self, thread_no: u64) -> Option<&BoardPage> {
        self.pages.iter().find(|page| page.contains(thread_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DescriptorInterner;

    fn pages() -> BoardPages {
        let board = DescriptorInterner::new().get_or_create("4chan").board("g");
        let page = |current: u32, threads: &[u64]| BoardPage {
            current_page: current,
            total_pages: 2,
            threads: threads
                .iter()
                .map(|no| ThreadNoTimeModPair {
                    thread: board.thread(*no),
                    modified: 0,
                })
                .collect(),
        };

        BoardPages {
            board: board.clone(),
            pages: vec![page(1, &[10, 11]), page(2, &[12])],
        }
    }

    #[test]
    fn test_find_page() {
        let pages = pages();
        assert_eq!(pages.find_page(11).unwrap().current_page, 1);
        assert_eq!(pages.find_page(12).unwrap().current_page, 2);
        assert!(pages.find_page(99).is_none());
    }

    #[test]
    fn test_last_page() {
        let pages = pages();
        assert!(!pages.find_page(10).unwrap().is_on_last_page());
        assert!(pages.find_page(12).unwrap().is_on_last_page());
    }
}
