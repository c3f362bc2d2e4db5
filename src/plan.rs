use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::OnceLock;

/// Editable sections of an account plan, named as the backend expects them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Snapshot,
    MarketOpportunity,
    IdealCustomerProfile,
    KeyStakeholders,
    RecommendedNextSteps,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Snapshot => "snapshot",
            Section::MarketOpportunity => "market_opportunity",
            Section::IdealCustomerProfile => "ideal_customer_profile",
            Section::KeyStakeholders => "key_stakeholders",
            Section::RecommendedNextSteps => "recommended_next_steps",
        }
    }

    pub fn all() -> Vec<Section> {
        vec![
            Section::Snapshot,
            Section::MarketOpportunity,
            Section::IdealCustomerProfile,
            Section::KeyStakeholders,
            Section::RecommendedNextSteps,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Section::Snapshot => "Company Snapshot",
            Section::MarketOpportunity => "Market Opportunity",
            Section::IdealCustomerProfile => "Ideal Customer Profile",
            Section::KeyStakeholders => "Key Stakeholders",
            Section::RecommendedNextSteps => "Recommended Next Steps",
        }
    }

    /// 1-based position in the rendered plan
    pub fn number(&self) -> usize {
        match self {
            Section::Snapshot => 1,
            Section::MarketOpportunity => 2,
            Section::IdealCustomerProfile => 3,
            Section::KeyStakeholders => 4,
            Section::RecommendedNextSteps => 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub headquarters: String,
    #[serde(deserialize_with = "lenient_string")]
    pub founded: String,
    #[serde(deserialize_with = "lenient_string")]
    pub revenue_estimate: String,
    #[serde(deserialize_with = "lenient_string")]
    pub employees_estimate: String,
    #[serde(deserialize_with = "lenient_list")]
    pub primary_products: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarketOpportunity {
    #[serde(deserialize_with = "lenient_string")]
    pub segment: String,
    #[serde(deserialize_with = "lenient_string")]
    pub tams_sams_soms: String,
    #[serde(deserialize_with = "lenient_list")]
    pub growth_drivers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IdealCustomerProfile {
    #[serde(deserialize_with = "lenient_string")]
    pub industry: String,
    #[serde(deserialize_with = "lenient_string")]
    pub company_size: String,
    #[serde(deserialize_with = "lenient_string")]
    pub revenues: String,
    #[serde(deserialize_with = "lenient_string")]
    pub geography: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Stakeholder {
    #[serde(deserialize_with = "lenient_string")]
    pub role: String,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
}

/// Structured sales-research record produced by the backend
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AccountPlan {
    #[serde(deserialize_with = "lenient_string")]
    pub company_name: String,
    pub snapshot: Snapshot,
    pub market_opportunity: MarketOpportunity,
    pub ideal_customer_profile: IdealCustomerProfile,
    pub key_stakeholders: Vec<Stakeholder>,
    #[serde(deserialize_with = "lenient_list")]
    pub recommended_next_steps: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub confidence: String,
}

impl AccountPlan {
    /// Parse a plan from JSON text. The top level must be an object naming
    /// the company or carrying a snapshot; anything else is not a plan.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(text).ok()? {
            Value::Object(map) if map.contains_key("company_name") || map.contains_key("snapshot") => {
                serde_json::from_value(Value::Object(map)).ok()
            }
            _ => None,
        }
    }

    /// Current text of a section, used to pre-fill the editor
    pub fn section_text(&self, section: Section) -> String {
        match section {
            Section::Snapshot => self.snapshot.description.clone(),
            Section::MarketOpportunity => self.market_opportunity.segment.clone(),
            Section::IdealCustomerProfile => self.ideal_customer_profile.industry.clone(),
            Section::KeyStakeholders => self
                .key_stakeholders
                .iter()
                .map(|s| format!("{}: {}", s.role, s.name))
                .collect::<Vec<_>>()
                .join("\n"),
            Section::RecommendedNextSteps => self.recommended_next_steps.join("\n"),
        }
    }
}

/// What a bot message displays
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Plan(AccountPlan),
    /// Plan text that did not parse, shown verbatim
    RawPlan(String),
}

/// Decide how a backend reply is shown.
///
/// No plan means the plain reply. Otherwise the plan text is taken from
/// `raw_output` (or the plan value itself), code fences are stripped and the
/// rest is parsed. Unparseable text degrades to a raw block.
pub fn format_reply(account_plan: Option<&Value>, reply: Option<&str>) -> MessageBody {
    let plan = match account_plan {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {
            return MessageBody::Text(reply.unwrap_or_default().to_string());
        }
        Some(plan) => plan,
    };

    let raw = match plan.get("raw_output").and_then(Value::as_str) {
        Some(raw) if !raw.is_empty() => raw.to_string(),
        _ => match plan {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };

    let clean = strip_fences(&raw);
    match AccountPlan::parse(&clean) {
        Some(plan) => MessageBody::Plan(plan),
        None => {
            tracing::debug!(len = clean.len(), "account plan did not parse, showing raw text");
            MessageBody::RawPlan(clean)
        }
    }
}

/// Remove markdown code-fence markers and surrounding whitespace
pub fn strip_fences(raw: &str) -> String {
    static JSON_FENCE: OnceLock<Regex> = OnceLock::new();
    let json_fence = JSON_FENCE.get_or_init(|| Regex::new(r"(?i)```json").expect("fence pattern compiles"));
    json_fence.replace_all(raw, "").replace("```", "").trim().to_string()
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

pub(crate) fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(scalar_text).collect(),
        Value::Null => Vec::new(),
        single => vec![scalar_text(single)],
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) const PLAN_JSON: &str = r#"{
        "company_name": "Zoom",
        "snapshot": {
            "description": "Video communications platform",
            "headquarters": "San Jose, CA",
            "founded": 2011,
            "revenue_estimate": "$4.5B",
            "employees_estimate": "7,400",
            "primary_products": ["Meetings", "Phone", "Rooms"]
        },
        "market_opportunity": {
            "segment": "Unified communications",
            "tams_sams_soms": "$60B / $20B / $5B",
            "growth_drivers": ["Hybrid work", "AI features"]
        },
        "ideal_customer_profile": {
            "industry": "Enterprise software",
            "company_size": "1000+",
            "revenues": "$100M+",
            "geography": "North America"
        },
        "key_stakeholders": [
            {"role": "CIO", "name": "Harry Moseley"},
            {"role": "CEO", "name": "Eric Yuan"}
        ],
        "recommended_next_steps": ["Book discovery call", "Map IT org"],
        "confidence": 0.82
    }"#;

    #[test]
    fn no_plan_returns_plain_reply() {
        let body = format_reply(None, Some("Which company should I research?"));
        assert_eq!(body, MessageBody::Text("Which company should I research?".to_string()));

        let body = format_reply(Some(&Value::Null), Some("hi"));
        assert_eq!(body, MessageBody::Text("hi".to_string()));
    }

    #[test]
    fn fenced_plan_matches_unwrapped_plan() {
        let fenced = format!("```json\n{}\n```", PLAN_JSON);
        let from_fenced = format_reply(Some(&json!({ "raw_output": fenced })), None);
        let from_plain = format_reply(Some(&json!({ "raw_output": PLAN_JSON })), None);

        assert_eq!(from_fenced, from_plain);
        let MessageBody::Plan(plan) = from_fenced else {
            panic!("expected a parsed plan");
        };
        assert_eq!(plan.company_name, "Zoom");
        assert_eq!(plan.snapshot.founded, "2011");
        assert_eq!(plan.key_stakeholders[1].name, "Eric Yuan");
        assert_eq!(plan.confidence, "0.82");
    }

    #[test]
    fn uppercase_fence_is_stripped() {
        assert_eq!(strip_fences("```JSON\n{\"a\":1}\n```  "), "{\"a\":1}");
    }

    #[test]
    fn malformed_raw_output_falls_back_verbatim() {
        let raw = "Zoom plan: revenue unknown <b>TBD</b> & more";
        let body = format_reply(Some(&json!({ "raw_output": raw })), None);
        assert_eq!(body, MessageBody::RawPlan(raw.to_string()));
    }

    #[test]
    fn plan_object_without_raw_output_is_serialized() {
        let value: Value = serde_json::from_str(PLAN_JSON).unwrap();
        let MessageBody::Plan(plan) = format_reply(Some(&value), Some("ignored")) else {
            panic!("expected a parsed plan");
        };
        assert_eq!(plan.market_opportunity.growth_drivers, vec!["Hybrid work", "AI features"]);
    }

    #[test]
    fn plan_given_as_json_string_is_parsed() {
        let value = Value::String(format!("```json {} ```", PLAN_JSON));
        assert!(matches!(format_reply(Some(&value), None), MessageBody::Plan(_)));
    }

    #[test]
    fn non_object_json_is_not_a_plan() {
        assert!(AccountPlan::parse("[1, 2, 3]").is_none());
        assert!(AccountPlan::parse("\"just text\"").is_none());
    }

    #[test]
    fn object_without_plan_keys_is_shown_raw() {
        assert!(AccountPlan::parse(r#"{"error": "model timed out"}"#).is_none());
        assert!(AccountPlan::parse(r#"{"company_name": "Acme"}"#).is_some());
        assert!(AccountPlan::parse(r#"{"snapshot": {"founded": 1999}}"#).is_some());

        let raw = r#"{"error": "model timed out"}"#;
        let body = format_reply(Some(&json!({ "raw_output": raw })), None);
        assert_eq!(body, MessageBody::RawPlan(raw.to_string()));
    }

    #[test]
    fn section_text_prefills_each_section() {
        let plan = AccountPlan::parse(PLAN_JSON).unwrap();
        assert_eq!(plan.section_text(Section::Snapshot), "Video communications platform");
        assert_eq!(plan.section_text(Section::MarketOpportunity), "Unified communications");
        assert_eq!(plan.section_text(Section::IdealCustomerProfile), "Enterprise software");
        assert_eq!(
            plan.section_text(Section::KeyStakeholders),
            "CIO: Harry Moseley\nCEO: Eric Yuan"
        );
        assert_eq!(
            plan.section_text(Section::RecommendedNextSteps),
            "Book discovery call\nMap IT org"
        );
    }

    #[test]
    fn section_wire_names_are_exact() {
        let names: Vec<&str> = Section::all().iter().map(Section::as_str).collect();
        assert_eq!(
            names,
            vec![
                "snapshot",
                "market_opportunity",
                "ideal_customer_profile",
                "key_stakeholders",
                "recommended_next_steps"
            ]
        );
    }
}
