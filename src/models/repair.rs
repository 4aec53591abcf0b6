//! 配置修复报告

use std::path::PathBuf;

/// 修复结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// 重写了配置文件
    Repaired,
    /// 文件本身没有问题
    AlreadyHealthy,
    /// 已有修复在进行，本次没有执行
    Skipped,
}

/// 修复报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub outcome: RepairOutcome,
    /// 按顺序记录的修复步骤
    pub steps: Vec<String>,
    /// 损坏文件的备份位置
    pub backup_path: Option<PathBuf>,
    /// 是否从损坏文件中抢救出了内容（否则为默认配置）
    pub salvaged: bool,
}

impl RepairReport {
    pub fn new(outcome: RepairOutcome) -> Self {
        Self {
            outcome,
            steps: Vec::new(),
            backup_path: None,
            salvaged: false,
        }
    }

    pub fn skipped() -> Self {
        let mut report = Self::new(RepairOutcome::Skipped);
        report.step("配置修复正在进行中，跳过本次请求");
        report
    }

    pub fn step(&mut self, message: impl Into<String>) {
        self.steps.push(message.into());
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == RepairOutcome::Skipped
    }

    /// 多行文本形式，便于写入日志
    pub fn summary(&self) -> String {
        self.steps.join("\n")
    }
}
