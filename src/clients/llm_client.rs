/// LLM API 客户端
///
/// 封装与 OpenAI / Azure OpenAI 兼容接口的调用，对外只暴露 `TextGenerator`。
use async_openai::{
    config::{AzureConfig, OpenAIConfig},
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{ApiKind, Config};
use crate::error::LlmError;

/// 文本生成能力
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 发送一次对话请求，返回去掉首尾空白的回复
    async fn complete(&self, system_message: Option<&str>, user_message: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

enum Backend {
    OpenAi(Client<OpenAIConfig>),
    Azure(Client<AzureConfig>),
}

/// LLM 客户端
pub struct LlmClient {
    backend: Backend,
    model_name: String,
    temperature: Option<f32>,
    max_tokens: u32,
}

impl LlmClient {
    /// 按配置创建生成用客户端
    pub fn new(config: &Config) -> Self {
        Self::for_model(config, &config.llm_model_name, config.llm_temperature)
    }

    /// 评估用客户端：独立模型名，温度固定为 0
    pub fn for_evaluation(config: &Config) -> Self {
        let model = config
            .evaluation_model_name
            .as_deref()
            .unwrap_or(&config.llm_model_name);
        Self::for_model(config, model, Some(0.0))
    }

    /// 指定模型创建客户端（Azure 下模型名即部署名）
    pub fn for_model(config: &Config, model_name: &str, temperature: Option<f32>) -> Self {
        let backend = match config.api_kind {
            ApiKind::OpenAi => {
                let openai_config = OpenAIConfig::new()
                    .with_api_key(&config.llm_api_key)
                    .with_api_base(&config.llm_api_base_url);
                Backend::OpenAi(Client::with_config(openai_config))
            }
            ApiKind::Azure => {
                let azure_config = AzureConfig::new()
                    .with_api_base(&config.llm_api_base_url)
                    .with_api_key(&config.llm_api_key)
                    .with_api_version(&config.azure_api_version)
                    .with_deployment_id(model_name);
                Backend::Azure(Client::with_config(azure_config))
            }
        };

        Self {
            backend,
            model_name: model_name.to_string(),
            temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    fn api_failed(&self, source: async_openai::error::OpenAIError) -> LlmError {
        LlmError::ApiCallFailed {
            model: self.model_name.clone(),
            source,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, system_message: Option<&str>, user_message: &str) -> Result<String, LlmError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();
        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| self.api_failed(e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| self.api_failed(e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model_name)
            .messages(messages)
            .max_tokens(self.max_tokens);
        if let Some(temperature) = self.temperature {
            builder.temperature(temperature);
        }
        let request = builder.build().map_err(|e| self.api_failed(e))?;

        let response = match &self.backend {
            Backend::OpenAi(client) => client.chat().create(request).await,
            Backend::Azure(client) => client.chat().create(request).await,
        }
        .map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.api_failed(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
