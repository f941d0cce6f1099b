//! MQTT-style topic matching and NATS subject mapping.
//!
//! Topics are `/`-separated. `+` matches exactly one level, `#` matches the
//! remainder of the topic and is only meaningful as the final segment.

/// Returns true if `topic` matches `pattern`.
#[must_use]
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut topic_segments = topic.split('/');

    loop {
        match (pattern_segments.next(), topic_segments.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Maps a topic or pattern to a NATS subject.
///
/// `/` becomes `.`, `+` becomes `*`, and `#` becomes `>`. Topic segments
/// must not themselves contain `.` for the mapping to stay bijective; device
/// ids produced by the hub satisfy this.
#[must_use]
pub fn to_subject(topic: &str) -> String {
    topic
        .split('/')
        .map(|segment| match segment {
            "+" => "*",
            "#" => ">",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Maps a NATS subject back to the topic it was published under.
#[must_use]
pub fn to_topic(subject: &str) -> String {
    subject.replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("hf/device/state/d1", "hf/device/state/d1"));
        assert!(!matches("hf/device/state/d1", "hf/device/state/d2"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("hf/device/state/+", "hf/device/state/d1"));
        assert!(!matches("hf/device/state/+", "hf/device/state/d1/extra"));
        assert!(!matches("hf/device/state/+", "hf/device/state"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("hf/#", "hf/device/state/d1"));
        assert!(matches("hf/device/#", "hf/device/command_result/d1"));
        assert!(!matches("other/#", "hf/device/state/d1"));
    }

    #[test]
    fn subject_mapping() {
        assert_eq!(to_subject("hf/device/state/+"), "hf.device.state.*");
        assert_eq!(to_subject("hf/device/command/d1"), "hf.device.command.d1");
        assert_eq!(to_subject("hf/#"), "hf.>");
    }

    #[test]
    fn subject_roundtrip() {
        let topic = "hf/device/state/d1";
        assert_eq!(to_topic(&to_subject(topic)), topic);
    }
}
