//! LLM 服务 - 业务能力层
//!
//! 只负责"调用视觉模型"能力，不关心报表结构和评分
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点，模型按请求指定
//! - 兼容 OpenAI API 的服务（网关、代理等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ExtractionError};

/// 单次调用参数
#[derive(Debug, Clone)]
pub struct LlmCall<'a> {
    pub model: &'a str,
    pub system_message: Option<&'a str>,
    pub user_message: &'a str,
    /// 图片 URL（可以是 data URL），会追加到用户消息中
    pub images: &'a [String],
    pub max_tokens: u32,
}

/// LLM 服务
pub struct LlmService {
    client: Client<OpenAIConfig>,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 返回
    /// 返回模型响应的文本内容（已去除首尾空白）
    pub async fn send_to_llm(&self, call: LlmCall<'_>) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", call.model);
        debug!("用户消息长度: {} 字符，图片 {} 张", call.user_message.len(), call.images.len());

        let build_err = |e: async_openai::error::OpenAIError| AppError::extraction_api_failed(call.model, e.to_string());

        let mut messages = Vec::new();

        if let Some(sys_msg) = call.system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(build_err)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = if call.images.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(call.user_message)
                .build()
                .map_err(build_err)?
        } else {
            // Vision API：文本 + 图片
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: call.user_message.to_string(),
                },
            ));
            for url in call.images {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::High),
                        },
                    },
                ));
            }
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(build_err)?
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(call.model)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(call.max_tokens)
            .build()
            .map_err(build_err)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            build_err(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ExtractionError::EmptyResponse {
                model: call.model.to_string(),
            })?;

        Ok(content.trim().to_string())
    }
}
