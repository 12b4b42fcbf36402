use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 标准答案相关错误
    #[error("标准答案错误: {0}")]
    AnswerKey(#[from] AnswerKeyError),
    /// 提取服务错误
    #[error("提取错误: {0}")]
    Extraction(#[from] ExtractionError),
    /// 评分逻辑错误
    #[error("评分错误: {0}")]
    Grading(#[from] GradingError),
    /// 运行记录存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 标准答案错误
#[derive(Debug, Error)]
pub enum AnswerKeyError {
    /// 公司没有标准答案文件
    #[error("找不到公司 {company_id} 的标准答案 ({path})")]
    NotFound { company_id: String, path: String },
    /// 读取文件失败
    #[error("读取标准答案失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("解析标准答案失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 写入文件失败
    #[error("写入标准答案失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 提取服务错误
///
/// 这些错误只影响单个文件，不会终止整个测试
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// 待提取的文档不存在
    #[error("文档不存在: {path}")]
    FileNotFound { path: String },
    /// 不支持的文档格式
    #[error("不支持的文档格式: {extension}")]
    UnsupportedFormat { extension: String },
    /// 模型 API 调用失败
    #[error("模型 API 调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 模型返回内容为空
    #[error("模型返回内容为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 返回内容不符合报表结构
    #[error("提取结果结构无效: {message}")]
    InvalidPayload { message: String },
    /// 超时
    #[error("提取超时 ({seconds} 秒)")]
    Timeout { seconds: u64 },
}

/// 评分逻辑错误
#[derive(Debug, Error)]
pub enum GradingError {
    /// 数值不是有限数
    #[error("字段 {field} 的{side}值不是有限数: {value}")]
    NonFiniteValue {
        field: String,
        side: &'static str,
        value: f64,
    },
    /// 容差为负
    #[error("字段 {field} 的容差为负: {tolerance}")]
    NegativeTolerance { field: String, tolerance: f64 },
}

/// 运行记录存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 记录不存在
    #[error("测试记录不存在: {id}")]
    NotFound { id: String },
    /// 记录已存在
    #[error("测试记录已存在: {id}")]
    Duplicate { id: String },
    /// 状态只能向前推进
    #[error("测试记录 {id} 的状态不能从 {from} 变为 {to}")]
    InvalidTransition { id: String, from: String, to: String },
    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),
    /// 序列化失败
    #[error("记录序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 后台任务失败
    #[error("数据库任务执行失败: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值无效
    #[error("配置项 {key} 无效: {reason}")]
    InvalidValue { key: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Store(StoreError::Database(err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Store(StoreError::TaskJoin(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Extraction(ExtractionError::InvalidPayload {
            message: err.to_string(),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建模型 API 调用错误
    pub fn extraction_api_failed(model: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Extraction(ExtractionError::ApiCallFailed {
            model: model.into(),
            message: message.into(),
        })
    }

    /// 创建提取结果结构错误
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        AppError::Extraction(ExtractionError::InvalidPayload {
            message: message.into(),
        })
    }

    /// 创建记录不存在错误
    pub fn run_not_found(id: impl Into<String>) -> Self {
        AppError::Store(StoreError::NotFound { id: id.into() })
    }

    /// 是否为单文件级别的错误（提取或评分），这类错误不会终止整个测试
    pub fn is_file_level(&self) -> bool {
        matches!(self, AppError::Extraction(_) | AppError::Grading(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
