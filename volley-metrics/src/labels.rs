use strum::{Display, EnumString};

/// Outcome label on the `iteration` metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ResultLabel {
    Success,
    Fail,
    Dropped,
    Unknown,
}

/// Lifecycle stage label on the `iteration` metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StageLabel {
    Setup,
    Iteration,
    Teardown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn labels_render_snake_case() {
        assert_eq!(ResultLabel::Success.to_string(), "success");
        assert_eq!(ResultLabel::Dropped.to_string(), "dropped");
        assert_eq!(StageLabel::Teardown.to_string(), "teardown");
    }

    #[test]
    fn labels_parse_back() {
        assert_eq!(ResultLabel::from_str("fail").unwrap(), ResultLabel::Fail);
        assert_eq!(StageLabel::from_str("setup").unwrap(), StageLabel::Setup);
        assert!(ResultLabel::from_str("bogus").is_err());
    }
}
