use std::fmt;

use serde_json::json;

use crate::{Envelope, PageChapter, RequestInit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Summarize,
    Translate,
    Feedback,
    User,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Summarize => "summarize",
            Operation::Translate => "translate",
            Operation::Feedback => "feedback",
            Operation::User => "user",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one logical job on the client side.
///
/// `toggled` is the caller's explicit re-request counter: `0` means nothing is
/// requested, and bumping it forces a fresh channel for the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub operation: Operation,
    pub entity_id: String,
    pub toggled: u64,
}

impl JobKey {
    pub fn new(operation: Operation, entity_id: impl Into<String>, toggled: u64) -> Self {
        Self {
            operation,
            entity_id: entity_id.into(),
            toggled,
        }
    }

    pub fn port_name(&self) -> String {
        port_name(self.operation.as_str(), &self.entity_id)
    }
}

/// Channel names follow `<operation>-<entityId>`.
pub fn port_name(operation: &str, entity_id: &str) -> String {
    format!("{operation}-{entity_id}")
}

/// Splits a channel name back into its operation prefix and entity id.
pub fn split_port_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once('-') {
        Some((operation, entity)) => (operation, Some(entity)),
        None => (name, None),
    }
}

fn api_url(base_url: &str, operation: Operation, entity_id: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    match entity_id {
        Some(id) => format!("{base}/api/{operation}/{id}"),
        None => format!("{base}/api/{operation}"),
    }
}

pub fn summarize(
    base_url: &str,
    vid: &str,
    chapters: &[PageChapter],
    no_transcript: bool,
) -> Envelope {
    let body = json!({
        "chapters": chapters,
        "no_transcript": no_transcript,
    });
    Envelope::request(
        api_url(base_url, Operation::Summarize, Some(vid)),
        RequestInit::post_json(&body),
    )
}

pub fn translate(base_url: &str, vid: &str, cid: &str, lang: &str) -> Envelope {
    let body = json!({ "cid": cid, "lang": lang });
    Envelope::request(
        api_url(base_url, Operation::Translate, Some(vid)),
        RequestInit::post_json(&body),
    )
}

pub fn feedback(base_url: &str, vid: &str, good: &[String], bad: &[String]) -> Envelope {
    let body = json!({ "good": good, "bad": bad });
    Envelope::request(
        api_url(base_url, Operation::Feedback, Some(vid)),
        RequestInit::post_json(&body),
    )
}

/// `POST /api/user`, minting an anonymous id.
pub fn user_url(base_url: &str) -> String {
    api_url(base_url, Operation::User, None)
}
