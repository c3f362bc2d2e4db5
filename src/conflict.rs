use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::plan::lenient_list;

/// One candidate value the backend found for a topic
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConflictValue {
    #[serde(default)]
    pub value: Value,
    /// Where the value was seen; the backend sends a list, single values are tolerated
    #[serde(default, deserialize_with = "lenient_list")]
    pub sources: Vec<String>,
}

impl ConflictValue {
    pub fn display(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub topic: String,
    pub values: Vec<ConflictValue>,
}

/// Contradictory values per topic, in the order the backend listed them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictSet {
    conflicts: Vec<Conflict>,
}

impl ConflictSet {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }

    pub fn first_topic(&self) -> Option<&str> {
        self.conflicts.first().map(|c| c.topic.as_str())
    }

    /// `topic: a / b` per topic, topics joined by `, `
    pub fn summary(&self) -> String {
        self.conflicts
            .iter()
            .map(|c| {
                let values: Vec<String> = c.values.iter().map(ConflictValue::display).collect();
                format!("{}: {}", c.topic, values.join(" / "))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn banner_text(&self) -> String {
        format!("I'm finding conflicting data: {}", self.summary())
    }
}

impl<'de> Deserialize<'de> for ConflictSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // serde_json's preserve_order keeps the map in backend order
        let map = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        let mut conflicts = Vec::with_capacity(map.len());
        for (topic, raw) in map {
            let values = match raw {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(_) => serde_json::from_value(item)
                            .map_err(|e| <D::Error as serde::de::Error>::custom(e)),
                        bare => Ok(ConflictValue { value: bare, sources: Vec::new() }),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Value::Null => Vec::new(),
                single => vec![ConflictValue { value: single, sources: Vec::new() }],
            };
            conflicts.push(Conflict { topic, values });
        }
        Ok(Self { conflicts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ConflictSet {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn summary_joins_values_with_slashes() {
        let set = parse(r#"{"budget":[{"value":"10k"},{"value":"20k"}]}"#);
        assert_eq!(set.summary(), "budget: 10k / 20k");
        assert_eq!(set.banner_text(), "I'm finding conflicting data: budget: 10k / 20k");
    }

    #[test]
    fn topics_keep_backend_order() {
        let set = parse(
            r#"{"revenue":[{"value":"$1B"},{"value":"$2B"}],"employees":[{"value":5000},{"value":7000}]}"#,
        );
        assert_eq!(set.first_topic(), Some("revenue"));
        assert_eq!(set.summary(), "revenue: $1B / $2B, employees: 5000 / 7000");
    }

    #[test]
    fn sources_are_kept_when_present() {
        let set = parse(r#"{"revenue":[{"value":"4B","sources":["Wikipedia"]},{"value":"6B","sources":["News report","10-K"]}]}"#);
        let conflict = set.iter().next().unwrap();
        assert_eq!(conflict.values[0].sources, vec!["Wikipedia"]);
        assert_eq!(conflict.values[1].sources, vec!["News report", "10-K"]);
        assert_eq!(set.summary(), "revenue: 4B / 6B");
    }

    #[test]
    fn odd_sources_do_not_fail_the_set() {
        let set = parse(
            r#"{"hq":[{"value":"Austin","sources":"https://example.com"},{"value":"Dallas","sources":[7,null]},{"value":"Waco","sources":null}]}"#,
        );
        let values = &set.iter().next().unwrap().values;
        assert_eq!(values[0].sources, vec!["https://example.com"]);
        assert_eq!(values[1].sources, vec!["7", ""]);
        assert!(values[2].sources.is_empty());
        assert_eq!(set.summary(), "hq: Austin / Dallas / Waco");
    }

    #[test]
    fn empty_object_is_empty_set() {
        let set = parse("{}");
        assert!(set.is_empty());
        assert_eq!(set.first_topic(), None);
    }
}
