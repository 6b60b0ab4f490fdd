//! 任务树引擎：导航、结构变更、聚合维护与子记录贡献

pub mod contribution;
pub mod mutator;
pub mod navigator;
pub mod project;
pub mod reconciler;
pub mod service;

pub use project::AuditReport;
pub use service::TaskTreeService;
