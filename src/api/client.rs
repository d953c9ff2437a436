use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use super::models::{ApiResponse, BotApiConfig, File, Message, Update};
use crate::domain::{file_name_of, BotError, ChatId, MessageRef, Notifier};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API rejected {method} ({code}): {description}")]
    Rejected {
        method: String,
        code: i64,
        description: String,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("File I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<ApiError> for BotError {
    fn from(e: ApiError) -> Self {
        BotError::Transport(e.to_string())
    }
}

#[derive(Clone)]
pub struct BotApiClient {
    http: Client,
    base: Url,
    config: BotApiConfig,
}

impl BotApiClient {
    pub fn new(config: BotApiConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            http: Client::new(),
            base: Url::parse(&base)?,
            config,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        // The leading "./" stops a token like "123:abc" from parsing as a URL scheme.
        Ok(self
            .base
            .join(&format!("./bot{}/{}", self.config.token, method))?)
    }

    fn file_url(&self, file_path: &str) -> Result<Url> {
        Ok(self
            .base
            .join(&format!("./file/bot{}/{}", self.config.token, file_path))?)
    }

    async fn decode<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        // Rejections come back as non-2xx with a JSON body, so the status is not checked first.
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", method, e)))?;

        if !envelope.ok {
            return Err(ApiError::Rejected {
                method: method.to_string(),
                code: envelope.error_code.unwrap_or_default(),
                description: envelope.description.unwrap_or_default(),
            });
        }
        envelope
            .result
            .ok_or_else(|| ApiError::InvalidResponse(format!("{}: missing result", method)))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &impl Serialize) -> Result<T> {
        let response = self
            .http
            .post(self.method_url(method)?)
            .json(body)
            .send()
            .await?;
        Self::decode(method, response).await
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let timeout = self.config.poll_timeout_secs;
        let mut body = json!({ "timeout": timeout, "allowed_updates": ["message"] });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let response = self
            .http
            .post(self.method_url("getUpdates")?)
            .timeout(Duration::from_secs(timeout + 10))
            .json(&body)
            .send()
            .await?;
        Self::decode("getUpdates", response).await
    }

    pub async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<Message> {
        self.call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await
    }

    pub async fn edit_message_text(&self, chat_id: ChatId, message_id: i64, text: &str) -> Result<()> {
        // The result is either the edited message or `true`.
        let _: Value = self
            .call(
                "editMessageText",
                &json!({ "chat_id": chat_id, "message_id": message_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: ChatId, message_id: i64) -> Result<bool> {
        self.call(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
    }

    /// Streams the file from disk as a multipart upload.
    pub async fn send_document(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<Message> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let part = Part::stream_with_length(Body::from(file), length).file_name(file_name_of(path));
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let response = self
            .http
            .post(self.method_url("sendDocument")?)
            .multipart(form)
            .send()
            .await?;
        Self::decode("sendDocument", response).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File> {
        self.call("getFile", &json!({ "file_id": file_id })).await
    }

    pub async fn download_file(&self, file_path: &str) -> Result<bytes::Bytes> {
        let response = self
            .http
            .get(self.file_url(file_path)?)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl Notifier for BotApiClient {
    async fn send_text(&self, chat: ChatId, text: &str) -> std::result::Result<MessageRef, BotError> {
        let message = self.send_message(chat, text).await?;
        Ok(MessageRef {
            chat_id: message.chat.id,
            message_id: message.message_id,
        })
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> std::result::Result<(), BotError> {
        Ok(self
            .edit_message_text(message.chat_id, message.message_id, text)
            .await?)
    }

    async fn delete_message(&self, message: &MessageRef) -> std::result::Result<(), BotError> {
        BotApiClient::delete_message(self, message.chat_id, message.message_id).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
    ) -> std::result::Result<(), BotError> {
        BotApiClient::send_document(self, chat, path, caption).await?;
        Ok(())
    }

    async fn download_attachment(
        &self,
        file_id: &str,
        dest: &Path,
    ) -> std::result::Result<PathBuf, BotError> {
        let file = self.get_file(file_id).await?;
        let remote_path = file
            .file_path
            .ok_or_else(|| ApiError::InvalidResponse("getFile: missing file_path".to_string()))?;
        let content = self.download_file(&remote_path).await?;
        tokio::fs::write(dest, &content).await?;
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const TOKEN: &str = "123:ABC";

    fn client(server: &mockito::ServerGuard) -> BotApiClient {
        BotApiClient::new(BotApiConfig {
            base_url: server.url(),
            token: TOKEN.to_string(),
            poll_timeout_secs: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_method_url_keeps_token_in_path() {
        let client = BotApiClient::new(BotApiConfig {
            base_url: "https://api.telegram.org".to_string(),
            token: TOKEN.to_string(),
            poll_timeout_secs: 30,
        })
        .unwrap();
        assert_eq!(
            client.method_url("sendMessage").unwrap().as_str(),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
        assert_eq!(
            client.file_url("documents/file_1.torrent").unwrap().as_str(),
            "https://api.telegram.org/file/bot123:ABC/documents/file_1.torrent"
        );
    }

    #[tokio::test]
    async fn test_send_text_returns_message_ref() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:ABC/sendMessage")
            .match_body(Matcher::PartialJson(json!({ "chat_id": 5, "text": "hi" })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":9,"chat":{"id":5},"date":0,"text":"hi"}}"#)
            .create_async()
            .await;

        let message = client(&server).send_text(5, "hi").await.unwrap();
        assert_eq!(
            message,
            MessageRef {
                chat_id: 5,
                message_id: 9
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejection_carries_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:ABC/editMessageText")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: message is not modified"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .edit_message_text(5, 9, "same")
            .await
            .unwrap_err();
        match &err {
            ApiError::Rejected { code, description, .. } => {
                assert_eq!(*code, 400);
                assert!(description.contains("message is not modified"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(BotError::from(err), BotError::Transport(_)));
    }

    #[tokio::test]
    async fn test_get_updates_parses_messages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:ABC/getUpdates")
            .match_body(Matcher::PartialJson(json!({ "offset": 41 })))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"result":[
                    {"update_id":41,"message":{"message_id":1,"from":{"id":7},"chat":{"id":7},"text":"/start"}},
                    {"update_id":42}
                ]}"#,
            )
            .create_async()
            .await;

        let updates = client(&server).get_updates(Some(41)).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].message.as_ref().unwrap().text.as_deref(), Some("/start"));
        assert!(updates[1].message.is_none());
    }

    #[tokio::test]
    async fn test_send_document_uploads_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:ABC/sendDocument")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(Matcher::Regex("payload-bytes".to_string()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":3,"chat":{"id":5}}}"#)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("movie.mkv");
        std::fs::write(&path, b"payload-bytes").unwrap();

        Notifier::send_document(&client(&server), 5, &path, "done")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_attachment_fetches_file_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:ABC/getFile")
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"file_id":"F1","file_path":"documents/file_1.torrent"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/file/bot123:ABC/documents/file_1.torrent")
            .with_body("d8:announce0:e")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("in.torrent");
        let written = client(&server)
            .download_attachment("F1", &dest)
            .await
            .unwrap();
        assert_eq!(written, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"d8:announce0:e");
    }
}
