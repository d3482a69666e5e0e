//! One logical conversation with the greenhouse assistant.
//!
//! Report requests ("me manda o csv") are answered locally with a download
//! link and never reach the remote assistant. Everything else is posted to
//! `/chat` together with the server-assigned session id so the backend can
//! keep context across turns. A failed turn appends one error bubble and
//! leaves the session usable.

use crate::backend::AssistantBackend;
use crate::error::FailureKind;
use crate::models::{ChatReply, ChatRequest, ReportArtifact};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Words that mark a report request, Portuguese and English.
pub const REPORT_KEYWORDS: [&str; 12] = [
    "csv",
    "export",
    "exportar",
    "download",
    "baixar",
    "data",
    "dados",
    "arquivo",
    "report",
    "relatorio",
    "relatório",
    "planilha",
];

pub const REPORT_READY_TEXT: &str =
    "📊 Tudo pronto! Você pode baixar os dados da estufa pelo link abaixo:";
pub const ASSISTANT_ERROR_TEXT: &str = "❌ Erro ao conectar com o assistente.";
pub const EMPTY_REPLY_TEXT: &str = "Sem resposta.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportArtifact>,
}

impl ChatMessage {
    fn new(role: Role, text: String, report: Option<ReportArtifact>) -> Self {
        Self { id: Uuid::new_v4(), role, text, timestamp: Utc::now(), report }
    }
}

/// `Errored` only describes the last turn; the next `send` starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Idle,
    Sending,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// Empty input, nothing recorded.
    Ignored,
    /// Answered locally with the export link.
    ReportOffered,
    Answered,
    Failed(FailureKind),
}

pub struct ChatSession<A> {
    backend: Arc<A>,
    base_url: Url,
    report_url: String,
    session_id: Option<String>,
    transcript: Vec<ChatMessage>,
    state: ChatState,
}

impl<A: AssistantBackend> ChatSession<A> {
    /// `base_url` resolves relative download links; `report_path` is the
    /// export endpoint offered for local report requests.
    pub fn new(backend: Arc<A>, base_url: Url, report_path: &str) -> Self {
        let report_url = base_url
            .join(report_path.trim_start_matches('/'))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| report_path.to_string());
        Self {
            backend,
            base_url,
            report_url,
            session_id: None,
            transcript: Vec::new(),
            state: ChatState::Idle,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn report_url(&self) -> &str {
        &self.report_url
    }

    /// Forget the conversation; the next remote turn starts a new session.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.transcript.clear();
        self.state = ChatState::Idle;
    }

    /// Run one turn. Taking `&mut self` keeps turns strictly one at a time.
    pub async fn send(&mut self, message: &str) -> SendOutcome {
        let text = message.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        if self.state == ChatState::Sending {
            // the previous turn was dropped before its reply arrived
            warn!("💬 previous assistant turn was interrupted");
            self.push(Role::Bot, ASSISTANT_ERROR_TEXT.to_string(), None);
        }

        self.state = ChatState::Sending;
        self.push(Role::User, text.to_string(), None);

        if is_report_intent(text) {
            debug!("report intent matched, answering locally");
            let artifact = ReportArtifact {
                download_url: self.report_url.clone(),
                available: true,
            };
            let reply = format!("{}\n{}", REPORT_READY_TEXT, self.report_url);
            self.push(Role::Bot, reply, Some(artifact));
            self.state = ChatState::Idle;
            return SendOutcome::ReportOffered;
        }

        let request = ChatRequest {
            mensagem: text.to_string(),
            session_id: self.session_id.clone(),
        };
        match self.backend.chat(request).await {
            Ok(reply) => {
                self.adopt_session(reply.session_id.as_deref());
                let report = self.report_from(&reply);
                let answer = reply
                    .resposta
                    .as_deref()
                    .map(clean_reply)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| EMPTY_REPLY_TEXT.to_string());
                self.push(Role::Bot, answer, report);
                self.state = ChatState::Idle;
                SendOutcome::Answered
            }
            Err(e) => {
                warn!("assistant turn failed ({:?}): {}", e.kind(), e);
                self.push(Role::Bot, ASSISTANT_ERROR_TEXT.to_string(), None);
                self.state = ChatState::Errored;
                SendOutcome::Failed(e.kind())
            }
        }
    }

    fn adopt_session(&mut self, returned: Option<&str>) {
        let Some(id) = returned.filter(|id| !id.is_empty()) else {
            return;
        };
        match self.session_id.as_deref() {
            None => info!("💬 assistant session {} started", id),
            Some(current) if current != id => warn!(
                "💬 assistant switched session {} -> {}, context may have been reset",
                current, id
            ),
            Some(_) => return,
        }
        self.session_id = Some(id.to_string());
    }

    fn report_from(&self, reply: &ChatReply) -> Option<ReportArtifact> {
        let flagged = match reply.tem_relatorio {
            Some(flag) => flag,
            None => reply.url_download.is_some(),
        };
        if !flagged {
            return None;
        }
        let download_url = match reply.url_download.as_deref() {
            Some(url) => self.resolve_link(url),
            None => self.report_url.clone(),
        };
        Some(ReportArtifact { download_url, available: true })
    }

    fn resolve_link(&self, url: &str) -> String {
        if Url::parse(url).is_ok() {
            return url.to_string();
        }
        self.base_url
            .join(url.trim_start_matches('/'))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string())
    }

    fn push(&mut self, role: Role, text: String, report: Option<ReportArtifact>) {
        self.transcript.push(ChatMessage::new(role, text, report));
    }
}

/// Whole-word, case-insensitive match against [`REPORT_KEYWORDS`].
pub fn is_report_intent(message: &str) -> bool {
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| REPORT_KEYWORDS.contains(&word))
}

/// Trim and drop pictographic emoji the assistant likes to sprinkle in.
pub fn clean_reply(text: &str) -> String {
    text.chars()
        .filter(|c| !is_pictograph(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_pictograph(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1F5FF
            | 0x1F600..=0x1F64F
            | 0x1F680..=0x1F6FF
            | 0x1F900..=0x1F9FF
            | 0x2600..=0x26FF
            | 0xFE0F
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_intent_keywords() {
        assert!(is_report_intent("me manda o csv"));
        assert!(is_report_intent("Quero BAIXAR o relatório"));
        assert!(is_report_intent("please export the data"));
        assert!(is_report_intent("csv?"));
        assert!(!is_report_intent("qual a temperatura agora?"));
        // whole words only
        assert!(!is_report_intent("dadosfake"));
        assert!(!is_report_intent("exported"));
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(clean_reply("  🌱 Tudo certo na estufa 😀 "), "Tudo certo na estufa");
        assert_eq!(clean_reply("Umidade: 60%"), "Umidade: 60%");
        assert_eq!(clean_reply(" 😀 "), "");
    }
}
