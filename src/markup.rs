//! Declarative view tree for transcript messages.
//!
//! Messages are described as [`Node`]s built from typed input. The terminal
//! draws them through [`layout_rows`]; transcript export renders them with
//! [`to_html`], which escapes every text leaf.

use crate::plan::{AccountPlan, MessageBody, Section};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Heading(String),
    Paragraph(String),
    Field { label: String, value: String },
    Bullet(String),
    Section {
        section: Section,
        children: Vec<Node>,
    },
    Preformatted { label: String, body: String },
}

/// Kind of a laid-out row, used by the terminal renderer to pick styles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Heading,
    SectionTitle,
    Body,
    /// `label_len` characters of the row are the field label
    Field { label_len: usize },
    Bullet,
    Label,
    Preformatted,
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub kind: RowKind,
    pub text: String,
}

impl Row {
    fn new(kind: RowKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

pub fn message_view(body: &MessageBody) -> Vec<Node> {
    match body {
        MessageBody::Text(text) => vec![Node::Paragraph(text.clone())],
        MessageBody::Plan(plan) => plan_view(plan),
        MessageBody::RawPlan(raw) => vec![Node::Preformatted {
            label: "Account Plan (raw):".to_string(),
            body: raw.clone(),
        }],
    }
}

fn field(label: &str, value: impl Into<String>) -> Node {
    Node::Field {
        label: label.to_string(),
        value: value.into(),
    }
}

pub fn plan_view(plan: &AccountPlan) -> Vec<Node> {
    let snapshot = &plan.snapshot;
    let market = &plan.market_opportunity;
    let icp = &plan.ideal_customer_profile;

    vec![
        Node::Heading(format!("📌 Account Plan for {}", plan.company_name)),
        Node::Section {
            section: Section::Snapshot,
            children: vec![
                Node::Paragraph(snapshot.description.clone()),
                field("HQ", &snapshot.headquarters),
                field("Founded", &snapshot.founded),
                field("Revenue", &snapshot.revenue_estimate),
                field("Employees", &snapshot.employees_estimate),
                field("Products", snapshot.primary_products.join(", ")),
            ],
        },
        Node::Section {
            section: Section::MarketOpportunity,
            children: vec![
                field("Segment", &market.segment),
                field("TAM/SAM/SOM", &market.tams_sams_soms),
                field("Growth Drivers", market.growth_drivers.join(", ")),
            ],
        },
        Node::Section {
            section: Section::IdealCustomerProfile,
            children: vec![
                field("Industry", &icp.industry),
                field("Company Size", &icp.company_size),
                field("Revenues", &icp.revenues),
                field("Geography", &icp.geography),
            ],
        },
        Node::Section {
            section: Section::KeyStakeholders,
            children: plan
                .key_stakeholders
                .iter()
                .map(|s| Node::Bullet(format!("{}: {}", s.role, s.name)))
                .collect(),
        },
        Node::Section {
            section: Section::RecommendedNextSteps,
            children: plan
                .recommended_next_steps
                .iter()
                .map(|step| Node::Bullet(step.clone()))
                .collect(),
        },
        field("Confidence", &plan.confidence),
    ]
}

/// Flatten a view tree into display rows.
///
/// Multi-line text becomes one row per line. The reveal effect counts
/// characters over these rows, so the terminal and the reveal agree on length.
pub fn layout_rows(nodes: &[Node]) -> Vec<Row> {
    let mut rows = Vec::new();
    for node in nodes {
        push_rows(node, &mut rows);
    }
    rows
}

fn push_rows(node: &Node, rows: &mut Vec<Row>) {
    match node {
        Node::Heading(text) => rows.push(Row::new(RowKind::Heading, text.as_str())),
        Node::Paragraph(text) => {
            if text.is_empty() {
                rows.push(Row::new(RowKind::Body, ""));
            }
            for line in text.lines() {
                rows.push(Row::new(RowKind::Body, line));
            }
        }
        Node::Field { label, value } => {
            let prefix = format!("{}: ", label);
            rows.push(Row::new(
                RowKind::Field { label_len: prefix.chars().count() },
                format!("{}{}", prefix, value),
            ));
        }
        Node::Bullet(text) => rows.push(Row::new(RowKind::Bullet, format!("• {}", text))),
        Node::Section { section, children } => {
            rows.push(Row::new(RowKind::Blank, ""));
            rows.push(Row::new(
                RowKind::SectionTitle,
                format!("{}. {}  ✎", section.number(), section.display_name()),
            ));
            for child in children {
                push_rows(child, rows);
            }
        }
        Node::Preformatted { label, body } => {
            rows.push(Row::new(RowKind::Label, label.as_str()));
            for line in body.lines() {
                rows.push(Row::new(RowKind::Preformatted, line));
            }
        }
    }
}

/// Total characters the reveal effect has to type out
pub fn char_len(rows: &[Row]) -> usize {
    rows.iter().map(|row| row.text.chars().count()).sum()
}

/// Keep only the first `limit` characters across rows, dropping rows not reached yet
pub fn truncate_rows(rows: Vec<Row>, limit: usize) -> Vec<Row> {
    let mut remaining = limit;
    let mut visible = Vec::new();
    for row in rows {
        let len = row.text.chars().count();
        if len <= remaining {
            remaining -= len;
            visible.push(row);
        } else {
            if remaining > 0 {
                let text: String = row.text.chars().take(remaining).collect();
                visible.push(Row { kind: row.kind, text });
            }
            break;
        }
    }
    visible
}

/// Render a view tree as an HTML fragment
pub fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        push_html(node, &mut out);
    }
    out
}

fn push_html(node: &Node, out: &mut String) {
    match node {
        Node::Heading(text) => {
            out.push_str(&format!("<h3>{}</h3>\n", escape_html(text)));
        }
        Node::Paragraph(text) => {
            out.push_str(&format!("<p>{}</p>\n", escape_html(text)));
        }
        Node::Field { label, value } => {
            out.push_str(&format!("<p><b>{}:</b> {}</p>\n", escape_html(label), escape_html(value)));
        }
        Node::Bullet(text) => {
            out.push_str(&format!("<li>{}</li>\n", escape_html(text)));
        }
        Node::Section { section, children } => {
            out.push_str(&format!(
                "<div class=\"section-block\" data-section=\"{}\">\n",
                section.as_str()
            ));
            out.push_str(&format!(
                "<div class=\"section-header\"><b>{}. {}</b></div>\n",
                section.number(),
                escape_html(section.display_name())
            ));

            let mut in_list = false;
            for child in children {
                let is_bullet = matches!(child, Node::Bullet(_));
                if is_bullet && !in_list {
                    out.push_str("<ul>\n");
                } else if !is_bullet && in_list {
                    out.push_str("</ul>\n");
                }
                in_list = is_bullet;
                push_html(child, out);
            }
            if in_list {
                out.push_str("</ul>\n");
            }
            out.push_str("</div>\n");
        }
        Node::Preformatted { label, body } => {
            out.push_str(&format!("<b>{}</b><pre>{}</pre>\n", escape_html(label), escape_html(body)));
        }
    }
}
