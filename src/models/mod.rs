//! 数据模型模块

pub mod expert;
pub mod organization;
pub mod product;
pub mod turn;

pub use expert::Expert;
pub use organization::Organization;
pub use product::Product;
pub use turn::Turn;

/// 字段缺失时的占位文案
pub const FIELD_PLACEHOLDER: &str = "Đang cập nhật";

/// 带占位文案读取可选字段
pub fn field_or_placeholder(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or(FIELD_PLACEHOLDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_or_placeholder() {
        assert_eq!(field_or_placeholder(&Some("giá trị".into())), "giá trị");
        assert_eq!(field_or_placeholder(&None), FIELD_PLACEHOLDER);
    }
}
