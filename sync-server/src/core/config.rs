//! Engine configuration
//!
//! All knobs the sync tasks consult are collected here and passed in at
//! construction — nothing reads the environment mid-algorithm.
//!
//! # 环境变量
//!
//! | 环境变量 | 默认值 | 说明 |
//! |----------|--------|------|
//! | WORK_DIR | /var/lib/catalog-sync | 工作目录 |
//! | DATABASE_PATH | {WORK_DIR}/catalog.db | SQLite 数据库 |
//! | ERP_HOST | https://api.trademaster.pro | ERP API 地址 |
//! | ERP_API_VERSION | 2 | ERP API 版本 |
//! | ERP_API_KEY | (empty) | API 访问密钥 |
//! | SYNC_PAGE_SIZE | 100 | 商品分页大小 |
//! | SYNC_PAGE_DELAY_MS | 500 | 分页请求间隔 |

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.as_str(), "1" | "on" | "true" | "yes"),
        Err(_) => default,
    }
}

/// ERP endpoint coordinates
#[derive(Debug, Clone)]
pub struct ErpConfig {
    /// API host, e.g. `https://api.trademaster.pro`
    pub host: String,
    /// API version segment (`v{version}`)
    pub version: String,
    pub api_key: String,
    /// Currency code sent with order submissions
    pub currency: String,
    /// Host serving cached catalog images
    pub cache_host: String,
    /// Tenant folder on the cache host
    pub cache_folder: String,
}

/// What to do with a category whose declared parent cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Attach the orphan directly under the root
    #[default]
    AttachToRoot,
    /// Soft-delete the orphan
    MarkInvalid,
    /// Abort the whole pass
    RejectPass,
}

impl OrphanPolicy {
    fn parse(value: &str) -> Self {
        match value {
            "mark-invalid" => OrphanPolicy::MarkInvalid,
            "reject-pass" => OrphanPolicy::RejectPass,
            _ => OrphanPolicy::AttachToRoot,
        }
    }
}

/// Which price tier order exports quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PricingPolicy {
    #[default]
    Retail,
    /// Wholesale prices for orders carrying a registered user
    Wholesale,
}

/// Whether the ERP should verify stock while accepting an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockCheckPolicy {
    #[default]
    Always,
    RegisteredOnly,
    Never,
}

impl StockCheckPolicy {
    fn parse(value: &str) -> Self {
        match value {
            "registered-only" => StockCheckPolicy::RegisteredOnly,
            "never" | "off" => StockCheckPolicy::Never,
            _ => StockCheckPolicy::Always,
        }
    }
}

/// Engine configuration - all settings for the synchronization tasks
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Working directory for the database, images and logs
    pub work_dir: String,
    pub database_path: String,
    pub erp: ErpConfig,

    // === ERP routing ids (from the ERP's reference lists) ===
    /// Warehouse id
    pub storage: String,
    /// Own legal entity id
    pub legal_entity: String,
    /// Payment account id
    pub checkout: String,
    /// Counterparty id
    pub contractor: String,
    /// Document scheme id
    pub scheme: String,
    /// ERP operator id orders are filed under
    pub operator: String,

    // === Reconciliation ===
    pub page_size: i64,
    /// Delay between paginated ERP calls (rate limiting)
    pub page_delay_ms: u64,
    pub orphan_policy: OrphanPolicy,
    /// Prefix entity addresses with the parent category chain
    pub generate_addresses: bool,
    /// Download and link remote photos after a pass
    pub download_files: bool,
    /// Request a search reindex after a pass
    pub search_reindex: bool,

    // === Order export ===
    pub pricing_policy: PricingPolicy,
    pub stock_check_policy: StockCheckPolicy,

    // === Catalog publish ===
    /// Push local product edits back to the ERP automatically
    pub auto_upload: bool,
    pub upload_batch_size: usize,
    /// Public host local image URLs are composed against
    pub public_host: String,

    /// Interval between scheduled full sync passes (seconds, 0 disables)
    pub sync_interval_secs: u64,
}

impl SyncConfig {
    /// Load configuration from environment variables, with defaults
    pub fn from_env() -> Self {
        let work_dir = env_string("WORK_DIR", "/var/lib/catalog-sync");
        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| format!("{work_dir}/catalog.db"));

        Self {
            database_path,
            erp: ErpConfig {
                host: env_string("ERP_HOST", "https://api.trademaster.pro"),
                version: env_string("ERP_API_VERSION", "2"),
                api_key: env_string("ERP_API_KEY", ""),
                currency: env_string("ERP_CURRENCY", "RUB"),
                cache_host: env_string("ERP_CACHE_HOST", "https://trademaster.pro"),
                cache_folder: env_string("ERP_CACHE_FOLDER", ""),
            },
            storage: env_string("ERP_STORAGE_ID", "0"),
            legal_entity: env_string("ERP_LEGAL_ENTITY_ID", ""),
            checkout: env_string("ERP_CHECKOUT_ID", ""),
            contractor: env_string("ERP_CONTRACTOR_ID", ""),
            scheme: env_string("ERP_SCHEME_ID", ""),
            operator: env_string("ERP_OPERATOR_ID", ""),
            page_size: env_parse("SYNC_PAGE_SIZE", 100),
            page_delay_ms: env_parse("SYNC_PAGE_DELAY_MS", 500),
            orphan_policy: OrphanPolicy::parse(&env_string("SYNC_ORPHAN_POLICY", "attach-to-root")),
            generate_addresses: env_flag("SYNC_GENERATE_ADDRESSES", false),
            download_files: env_flag("SYNC_DOWNLOAD_FILES", false),
            search_reindex: env_flag("SYNC_SEARCH_REINDEX", false),
            pricing_policy: if env_flag("PRICING_WHOLESALE", false) {
                PricingPolicy::Wholesale
            } else {
                PricingPolicy::Retail
            },
            stock_check_policy: StockCheckPolicy::parse(&env_string(
                "STOCK_CHECK_POLICY",
                "always",
            )),
            auto_upload: env_flag("SYNC_AUTO_UPLOAD", false),
            upload_batch_size: env_parse("SYNC_UPLOAD_BATCH_SIZE", 100),
            public_host: env_string("PUBLIC_HOST", ""),
            sync_interval_secs: env_parse("SYNC_INTERVAL_SECS", 3600),
            work_dir,
        }
    }

    /// Configuration rooted at a custom work dir, with fast pagination.
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let work_dir = work_dir.into();
        let mut config = Self::from_env();
        config.database_path = format!("{work_dir}/catalog.db");
        config.work_dir = work_dir;
        config.page_delay_ms = 0;
        config
    }

    /// Directory downloaded images are materialized into
    pub fn images_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.work_dir).join("images")
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
