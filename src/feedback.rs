use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    #[default]
    None,
    Liked,
    Disliked,
}

impl Feedback {
    pub fn label(self) -> &'static str {
        match self {
            Feedback::None => "none",
            Feedback::Liked => "liked",
            Feedback::Disliked => "disliked",
        }
    }
}

/// Asking for the active value clears it; asking for the other value switches directly.
pub fn toggle(current: Feedback, requested: Feedback) -> Feedback {
    if current == requested {
        Feedback::None
    } else {
        requested
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackState {
    pub value: Feedback,
    pub submitting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub response_id: String,
    pub value: Feedback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReceipt {
    pub status: bool,
    pub applied_value: Feedback,
}

pub trait FeedbackService: Send + Sync {
    fn submit(&self, request: &FeedbackRequest) -> Result<FeedbackReceipt>;
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("feedback for response {0} was not accepted")]
    Rejected(String),
    #[error("feedback endpoint not configured")]
    EndpointMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Submitted { target: Feedback },
    /// A submission for this response is still in flight.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    Applied {
        response_id: String,
        value: Feedback,
    },
    Failed {
        response_id: String,
        requested: Feedback,
        message: String,
    },
}

struct Completion {
    response_id: String,
    requested: Feedback,
    result: Result<FeedbackReceipt, String>,
}

/// Owns the feedback state of every response shown on screen.
///
/// Submissions run on helper threads; their results come back over a channel and are
/// applied on the owning thread by [`FeedbackCoordinator::poll`] or
/// [`FeedbackCoordinator::wait_event`]. State only changes once the backend confirms.
pub struct FeedbackCoordinator {
    service: Arc<dyn FeedbackService>,
    states: HashMap<String, FeedbackState>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl FeedbackCoordinator {
    pub fn new(service: Arc<dyn FeedbackService>) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            service,
            states: HashMap::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn state(&self, response_id: &str) -> FeedbackState {
        self.states.get(response_id).copied().unwrap_or_default()
    }

    pub fn request(&mut self, response_id: &str, requested: Feedback) -> RequestOutcome {
        let state = self.states.entry(response_id.to_string()).or_default();
        if state.submitting {
            tracing::debug!(response_id, "feedback submission already in flight; ignoring");
            return RequestOutcome::Ignored;
        }
        let target = toggle(state.value, requested);
        state.submitting = true;

        let service = Arc::clone(&self.service);
        let tx = self.completion_tx.clone();
        let request = FeedbackRequest {
            response_id: response_id.to_string(),
            value: target,
        };
        tracing::debug!(
            response_id,
            value = target.label(),
            "submitting feedback"
        );
        thread::spawn(move || {
            let result = service
                .submit(&request)
                .map_err(|err| format!("{err:#}"));
            let _ = tx.send(Completion {
                response_id: request.response_id,
                requested: request.value,
                result,
            });
        });

        RequestOutcome::Submitted { target }
    }

    /// Applies every completed submission without blocking.
    pub fn poll(&mut self) -> Vec<FeedbackEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            events.push(self.complete(completion));
        }
        events
    }

    pub fn wait_event(&mut self, timeout: Duration) -> Option<FeedbackEvent> {
        let completion = self.completion_rx.recv_timeout(timeout).ok()?;
        Some(self.complete(completion))
    }

    fn complete(&mut self, completion: Completion) -> FeedbackEvent {
        let Completion {
            response_id,
            requested,
            result,
        } = completion;
        let state = self.states.entry(response_id.clone()).or_default();
        state.submitting = false;

        let failure = match result {
            Ok(receipt) if receipt.status => {
                state.value = receipt.applied_value;
                tracing::debug!(
                    response_id = response_id.as_str(),
                    value = receipt.applied_value.label(),
                    "feedback applied"
                );
                return FeedbackEvent::Applied {
                    response_id,
                    value: receipt.applied_value,
                };
            }
            Ok(_) => FeedbackError::Rejected(response_id.clone()).to_string(),
            Err(message) => message,
        };

        tracing::warn!(
            response_id = response_id.as_str(),
            error = failure.as_str(),
            "feedback submission failed"
        );
        FeedbackEvent::Failed {
            response_id,
            requested,
            message: failure,
        }
    }
}

pub struct HttpFeedbackService {
    client: Client,
    endpoint: String,
}

impl HttpFeedbackService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(FeedbackError::EndpointMissing.into());
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("replyview/{}", crate::VERSION))
            .build()
            .context("feedback: build http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl FeedbackService for HttpFeedbackService {
    fn submit(&self, request: &FeedbackRequest) -> Result<FeedbackReceipt> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .context("feedback: send")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("feedback: request failed: {} - {}", status, body));
        }

        response
            .json::<FeedbackReceipt>()
            .context("feedback: decode receipt")
    }
}
