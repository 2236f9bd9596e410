//! 实体抽取：从自由文本中识别工单号（WO）与产品号（PROD）
//!
//! 纯函数、无副作用、无失败路径；每种类型最多取第一个匹配，未匹配即缺省。
//! 规范化：大写，分隔符（`-` / `_` / 空格）统一为单个 `-`，无分隔符则保持紧凑写法。

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::BlackboardKey;

/// 标识符类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    WorkOrder,
    Product,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 2] = [IdentifierKind::WorkOrder, IdentifierKind::Product];

    fn prefix(&self) -> &'static str {
        match self {
            IdentifierKind::WorkOrder => "WO",
            IdentifierKind::Product => "PROD",
        }
    }

    /// 黑板键对应的标识符类型
    pub fn from_blackboard_key(key: BlackboardKey) -> Option<Self> {
        match key {
            BlackboardKey::WorkOrderId => Some(IdentifierKind::WorkOrder),
            BlackboardKey::ProductId => Some(IdentifierKind::Product),
            _ => None,
        }
    }

    /// 该类型标识符写入黑板时使用的键
    pub fn blackboard_key(&self) -> BlackboardKey {
        match self {
            IdentifierKind::WorkOrder => BlackboardKey::WorkOrderId,
            IdentifierKind::Product => BlackboardKey::ProductId,
        }
    }

    fn pattern(&self) -> &'static Regex {
        static WO: OnceLock<Regex> = OnceLock::new();
        static PROD: OnceLock<Regex> = OnceLock::new();
        let (cell, source) = match self {
            IdentifierKind::WorkOrder => (&WO, r"(?i)\b(WO)([-_ ])?(\d+)\b"),
            IdentifierKind::Product => (&PROD, r"(?i)\b(PROD)([-_ ])?(\d+)\b"),
        };
        cell.get_or_init(|| Regex::new(source).expect("static identifier pattern"))
    }
}

/// 规范化后的标识符
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl Identifier {
    pub fn new(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn work_order(value: impl Into<String>) -> Self {
        Self::new(IdentifierKind::WorkOrder, value)
    }

    pub fn product(value: impl Into<String>) -> Self {
        Self::new(IdentifierKind::Product, value)
    }

    /// 规范化外部给出的原始值（调用方或规划器种子）；整个值必须恰好是该类型的一个标识符
    pub fn normalized(kind: IdentifierKind, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let whole = kind.pattern().find(raw)?;
        if whole.start() != 0 || whole.end() != raw.len() {
            return None;
        }
        extract_kind(raw, kind)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// 抽取文本中的标识符；结果按类型排序（WorkOrder 在前），每种类型至多一个
pub fn extract(text: &str) -> Vec<Identifier> {
    IdentifierKind::ALL
        .iter()
        .filter_map(|kind| extract_kind(text, *kind))
        .collect()
}

/// 只抽取指定类型的第一个匹配
pub fn extract_kind(text: &str, kind: IdentifierKind) -> Option<Identifier> {
    let caps = kind.pattern().captures(text)?;
    let digits = caps.get(3)?.as_str();
    let value = if caps.get(2).is_some() {
        format!("{}-{}", kind.prefix(), digits)
    } else {
        format!("{}{}", kind.prefix(), digits)
    };
    Some(Identifier::new(kind, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_compact_work_order() {
        let ids = extract("Provide details of work order WO1");
        assert_eq!(ids, vec![Identifier::work_order("WO1")]);
    }

    #[test]
    fn test_extract_normalizes_separators() {
        assert_eq!(
            extract_kind("see wo_1234 please", IdentifierKind::WorkOrder),
            Some(Identifier::work_order("WO-1234"))
        );
        assert_eq!(
            extract_kind("clean prod 77881", IdentifierKind::Product),
            Some(Identifier::product("PROD-77881"))
        );
        assert_eq!(
            extract_kind("How do I clean product PROD-77881?", IdentifierKind::Product),
            Some(Identifier::product("PROD-77881"))
        );
    }

    #[test]
    fn test_extract_first_match_only() {
        let ids = extract("WO-1 then WO-2, PROD-9 and PROD-10");
        assert_eq!(
            ids,
            vec![Identifier::work_order("WO-1"), Identifier::product("PROD-9")]
        );
    }

    #[test]
    fn test_extract_nothing() {
        assert!(extract("What work order is scheduled today?").is_empty());
        // 需要完整的单词边界
        assert!(extract("SWO12 and PRODUCT12").is_empty());
    }

    #[test]
    fn test_extract_is_idempotent_on_normalized_values() {
        let first = extract("wo 42 with prod_7");
        let joined: Vec<&str> = first.iter().map(Identifier::as_str).collect();
        assert_eq!(extract(&joined.join(" ")), first);
    }

    #[test]
    fn test_normalized_seed_values() {
        assert_eq!(
            Identifier::normalized(IdentifierKind::Product, " prod_77881 "),
            Some(Identifier::product("PROD-77881"))
        );
        assert_eq!(
            Identifier::normalized(IdentifierKind::WorkOrder, "wo 5"),
            Some(Identifier::work_order("WO-5"))
        );
        assert_eq!(
            Identifier::normalized(IdentifierKind::WorkOrder, "WO1"),
            Some(Identifier::work_order("WO1"))
        );
        assert_eq!(Identifier::normalized(IdentifierKind::Product, "WO-5"), None);
        assert_eq!(Identifier::normalized(IdentifierKind::Product, "PROD-5 please"), None);
        assert_eq!(Identifier::normalized(IdentifierKind::Product, "n/a"), None);
    }
}
