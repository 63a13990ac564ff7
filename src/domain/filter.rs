use std::fmt;
use std::str::FromStr;

use crate::app::ChanError;

/// Which post field a filter pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    Subject,
    Comment,
    Name,
    Tripcode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterAction {
    Hide,
    Remove,
    Highlight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChanFilter {
    pub id: i64,
    pub enabled: bool,
    pub pattern: String,
    pub filter_type: FilterType,
    pub action: FilterAction,
    pub all_boards: bool,
    /// Entries are `site/board` pairs, matched case-insensitively.
    pub boards: Vec<String>,
}

impl ChanFilter {
    pub fn new(pattern: impl Into<String>, filter_type: FilterType, action: FilterAction) -> Self {
        Self {
            id: 0,
            enabled: true,
            pattern: pattern.into(),
            filter_type,
            action,
            all_boards: true,
            boards: Vec::new(),
        }
    }
}

macro_rules! string_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ChanError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ChanError::Parse(format!(
                        "unknown {}: {}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(FilterType {
    Subject => "subject",
    Comment => "comment",
    Name => "name",
    Tripcode => "tripcode",
});

string_enum!(FilterAction {
    Hide => "hide",
    Remove => "remove",
    Highlight => "highlight",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_type() {
        assert_eq!("Comment".parse::<FilterType>().unwrap(), FilterType::Comment);
        assert!("body".parse::<FilterType>().is_err());
    }

    #[test]
    fn test_action_display_round_trips() {
        for action in [FilterAction::Hide, FilterAction::Remove, FilterAction::Highlight] {
            assert_eq!(action.to_string().parse::<FilterAction>().unwrap(), action);
        }
    }
}
