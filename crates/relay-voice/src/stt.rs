use crate::error::VoiceError;
use relay_oracle::{OpenAiClient, OracleError};

/// Maximum audio input size accepted by the hosted transcription endpoint (25 MiB).
const MAX_STT_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Chat platforms deliver voice notes as Ogg/Opus.
const DEFAULT_FILE_NAME: &str = "voice.ogg";

#[derive(Debug, Clone)]
pub struct SttService {
    client: OpenAiClient,
    file_name: String,
}

impl SttService {
    pub fn new(client: OpenAiClient) -> Self {
        Self {
            client,
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }

    /// Overrides the upload file name; the endpoint infers the codec from its extension.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub async fn transcribe(&self, audio_data: &[u8]) -> Result<String, VoiceError> {
        if audio_data.is_empty() {
            return Err(VoiceError::Stt("audio data is empty".to_string()));
        }
        if audio_data.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio_data.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        match self
            .client
            .transcribe(audio_data.to_vec(), &self.file_name)
            .await
        {
            Ok(text) => {
                tracing::debug!(bytes = audio_data.len(), chars = text.chars().count(), "transcribed voice note");
                Ok(text)
            }
            Err(OracleError::EmptyResponse) => {
                Err(VoiceError::Stt("transcription is empty".to_string()))
            }
            Err(e) => Err(VoiceError::Oracle(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_oracle::OpenAiConfig;

    fn service() -> SttService {
        let client = OpenAiClient::new(
            OpenAiConfig::new("test-key").with_base_url("http://127.0.0.1:9/v1"),
        )
        .unwrap();
        SttService::new(client)
    }

    #[tokio::test]
    async fn empty_audio_is_rejected_before_upload() {
        let err = service().transcribe(&[]).await.unwrap_err();
        assert!(matches!(err, VoiceError::Stt(_)));
    }

    #[tokio::test]
    async fn oversized_audio_is_rejected_before_upload() {
        let audio = vec![0u8; MAX_STT_INPUT_BYTES + 1];
        let err = service().transcribe(&audio).await.unwrap_err();
        match err {
            VoiceError::Stt(msg) => assert!(msg.contains("exceeds maximum size")),
            other => panic!("expected STT error, got {other:?}"),
        }
    }
}
