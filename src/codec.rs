//! Conversion between the editable filter draft and the canonical filter
//! representation accepted by Gmail.
//!
//! Canonical filters only carry the fields that actually constrain or act:
//! empty strings, `false` flags and empty label lists are dropped rather than
//! sent as explicit "off" values. Nothing here validates that a filter makes
//! sense; the mail service is the authority on that.

use crate::models::{Filter, FilterAction, FilterCriteria, Label};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaDraft {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub query: String,
    pub has_attachment: bool,
    pub exclude_chats: bool,
}

impl Default for CriteriaDraft {
    fn default() -> Self {
        Self {
            from: String::new(),
            to: String::new(),
            subject: String::new(),
            query: String::new(),
            has_attachment: false,
            // Chats are excluded unless the user opts in.
            exclude_chats: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDraft {
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
    pub forward: String,
    pub mark_as_read: bool,
    pub mark_as_important: bool,
    pub delete: bool,
    pub never_spam: bool,
}

/// User-editable filter. `FilterDraft::default()` is the blank form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterDraft {
    pub criteria: CriteriaDraft,
    pub action: ActionDraft,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Normalizes a draft into the minimal canonical filter. The result has no id.
pub fn encode(draft: &FilterDraft) -> Filter {
    let c = &draft.criteria;
    let a = &draft.action;

    Filter {
        id: None,
        criteria: FilterCriteria {
            from: non_empty(&c.from),
            to: non_empty(&c.to),
            subject: non_empty(&c.subject),
            query: non_empty(&c.query),
            has_attachment: c.has_attachment,
            exclude_chats: c.exclude_chats,
        },
        action: FilterAction {
            add_label_ids: a.add_label_ids.clone(),
            remove_label_ids: a.remove_label_ids.clone(),
            forward: non_empty(&a.forward),
            mark_as_read: a.mark_as_read,
            mark_as_important: a.mark_as_important,
            delete: a.delete,
            never_spam: a.never_spam,
        },
    }
}

/// A single present field of a canonical filter, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    From(String),
    To(String),
    Subject(String),
    Query(String),
    HasAttachment,
    ExcludeChats,
    AddLabel(String),
    RemoveLabel(String),
    Forward(String),
    MarkAsRead,
    MarkAsImportant,
    Delete,
    NeverSpam,
}

impl Rule {
    pub fn is_criterion(&self) -> bool {
        matches!(
            self,
            Rule::From(_)
                | Rule::To(_)
                | Rule::Subject(_)
                | Rule::Query(_)
                | Rule::HasAttachment
                | Rule::ExcludeChats
        )
    }

    pub fn describe(&self, labels: &LabelLookup<'_>) -> String {
        match self {
            Rule::From(v) => format!("From: {}", v),
            Rule::To(v) => format!("To: {}", v),
            Rule::Subject(v) => format!("Subject: {}", v),
            Rule::Query(v) => format!("Query: {}", v),
            Rule::HasAttachment => "Has attachment".to_string(),
            Rule::ExcludeChats => "Exclude chats".to_string(),
            Rule::AddLabel(id) => format!("Add label: {}", labels.name(id)),
            Rule::RemoveLabel(id) => format!("Remove label: {}", labels.name(id)),
            Rule::Forward(v) => format!("Forward to: {}", v),
            Rule::MarkAsRead => "Mark as read".to_string(),
            Rule::MarkAsImportant => "Mark as important".to_string(),
            Rule::Delete => "Delete".to_string(),
            Rule::NeverSpam => "Never mark as spam".to_string(),
        }
    }
}

/// Lists the present fields of a canonical filter, criteria first. Absent
/// fields produce nothing; defaults are not reconstructed.
pub fn decode(filter: &Filter) -> Vec<Rule> {
    let c = &filter.criteria;
    let a = &filter.action;
    let mut rules = Vec::new();

    if let Some(v) = &c.from {
        rules.push(Rule::From(v.clone()));
    }
    if let Some(v) = &c.to {
        rules.push(Rule::To(v.clone()));
    }
    if let Some(v) = &c.subject {
        rules.push(Rule::Subject(v.clone()));
    }
    if let Some(v) = &c.query {
        rules.push(Rule::Query(v.clone()));
    }
    if c.has_attachment {
        rules.push(Rule::HasAttachment);
    }
    if c.exclude_chats {
        rules.push(Rule::ExcludeChats);
    }

    rules.extend(a.add_label_ids.iter().cloned().map(Rule::AddLabel));
    rules.extend(a.remove_label_ids.iter().cloned().map(Rule::RemoveLabel));
    if let Some(v) = &a.forward {
        rules.push(Rule::Forward(v.clone()));
    }
    if a.mark_as_read {
        rules.push(Rule::MarkAsRead);
    }
    if a.mark_as_important {
        rules.push(Rule::MarkAsImportant);
    }
    if a.delete {
        rules.push(Rule::Delete);
    }
    if a.never_spam {
        rules.push(Rule::NeverSpam);
    }

    rules
}

/// Label id → display name, falling back to the raw id.
pub struct LabelLookup<'a> {
    names: HashMap<&'a str, String>,
}

impl<'a> LabelLookup<'a> {
    pub fn new(labels: &'a [Label]) -> Self {
        Self {
            names: labels
                .iter()
                .map(|l| (l.id.as_str(), l.display_name()))
                .collect(),
        }
    }

    pub fn name<'b>(&'b self, id: &'b str) -> &'b str {
        self.names.get(id).map(String::as_str).unwrap_or(id)
    }
}
