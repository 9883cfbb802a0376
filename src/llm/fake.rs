//! Scripted completion client for tests.

use crate::error::ServiceError;
use crate::llm::{CompletionClient, CompletionRequest, CompletionTask};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
}

/// Replays queued replies per task. The last reply of a queue repeats.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<HashMap<CompletionTask, VecDeque<Reply>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for a task.
    pub fn reply(self, task: CompletionTask, text: &str) -> Self {
        self.push(task, Reply::Text(text.to_string()))
    }

    /// Queue a service failure for a task.
    pub fn fail(self, task: CompletionTask) -> Self {
        self.push(task, Reply::Fail)
    }

    fn push(self, task: CompletionTask, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(reply);
        self
    }

    /// Tasks requested so far, in order.
    pub fn calls(&self) -> Vec<CompletionTask> {
        self.calls.lock().unwrap().iter().map(|r| r.task).collect()
    }

    /// The most recent request for a task.
    pub fn last_request(&self, task: CompletionTask) -> Option<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.task == task)
            .cloned()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(request.clone());

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.entry(request.task).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) => Err(ServiceError::Api {
                status: 500,
                body: "scripted failure".to_string(),
            }),
            None => Err(ServiceError::InvalidResponse(format!(
                "no scripted reply for {:?}",
                request.task
            ))),
        }
    }
}

/// A well-formed image analysis reply.
pub const IMAGE_REPLY: &str = r#"{
  "findings": ["Irregular mass in the upper outer quadrant of the left breast"],
  "breast_density": "heterogeneously dense",
  "birads_category": 4,
  "risk_assessment": "Suspicious for malignancy",
  "recommendations": ["Recommend ultrasound-guided core biopsy"],
  "confidence_level": "high",
  "urgent_flags": ["Suspicious irregular mass"]
}"#;

/// A well-formed text analysis reply.
pub const TEXT_REPLY: &str = r#"{
  "key_findings": ["Palpable lump in right breast"],
  "risk_factors": ["Family history of breast cancer"],
  "symptoms": ["Lump", "Tenderness"],
  "recommendations": ["Recommend diagnostic mammography", "Consider genetic counseling"],
  "confidence_level": "medium",
  "urgency_level": "high",
  "summary": "New palpable lump with family history warrants prompt workup.",
  "information_sufficient": true,
  "missing_information": []
}"#;

/// A text analysis reply judging the description insufficient.
pub const INSUFFICIENT_TEXT_REPLY: &str = r#"{
  "key_findings": [],
  "symptoms": ["Breast pain"],
  "confidence_level": "low",
  "urgency_level": "low",
  "summary": "Breast pain without further context.",
  "information_sufficient": false,
  "missing_information": ["patient age", "symptom duration", "family history"]
}"#;

/// A synthesis reply.
pub const SYNTHESIS_REPLY: &str =
    "Summary: suspicious mass. Risk: elevated. Recommendation: biopsy. Next steps: referral.";
