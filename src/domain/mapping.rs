// ==========================================
// 会员数据导入同步 - 字段映射模型
// ==========================================
// 职责: 源列 → 目标字段绑定 + 目标表字段定义（含列名别名）
// ==========================================

use crate::domain::types::DestinationType;
use serde::{Deserialize, Serialize};

// ==========================================
// FieldMapping - 源列到目标字段的绑定
// ==========================================
// source_column 为空等价于未映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_column: String,
    pub target_field: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    pub fn new(source_column: &str, target_field: &str) -> Self {
        Self {
            source_column: source_column.to_string(),
            target_field: target_field.to_string(),
            required: false,
        }
    }

    pub fn is_unmapped(&self) -> bool {
        self.source_column.trim().is_empty()
    }
}

// ==========================================
// DestinationField - 固定目标表字段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationField {
    pub name: &'static str,
    pub required: bool,
    /// 自动匹配时识别的源列名（小写、去分隔符后比较）
    pub aliases: &'static [&'static str],
}

const fn field(
    name: &'static str,
    required: bool,
    aliases: &'static [&'static str],
) -> DestinationField {
    DestinationField {
        name,
        required,
        aliases,
    }
}

const MEMBER_FIELDS: &[DestinationField] = &[
    field("first_name", false, &["first_name", "firstname", "first", "fname", "given_name"]),
    field("last_name", false, &["last_name", "lastname", "last", "lname", "surname", "family_name"]),
    field("email", false, &["email", "email_address", "e_mail", "mail"]),
    field("phone", false, &["phone", "phone_number", "mobile", "cell", "telephone"]),
    field("date_of_birth", false, &["date_of_birth", "dob", "birthday", "birth_date"]),
    field("address", false, &["address", "street", "street_address", "address_line_1"]),
    field("city", false, &["city", "town"]),
    field("state", false, &["state", "province", "region"]),
    field("zip_code", false, &["zip_code", "zip", "postal_code", "postcode"]),
    field("membership_type", false, &["membership_type", "membership", "plan", "tier"]),
    field("join_date", false, &["join_date", "joined", "member_since", "signup_date"]),
    field("tags", false, &["tags", "labels", "groups"]),
    field("notes", false, &["notes", "note", "comments"]),
];

const TRANSACTION_FIELDS: &[DestinationField] = &[
    field("email", true, &["email", "email_address", "member_email", "customer_email"]),
    field("amount", true, &["amount", "total", "price", "value", "amount_paid"]),
    field("transaction_date", true, &["transaction_date", "date", "purchase_date", "paid_at"]),
    field("description", false, &["description", "item", "product", "memo"]),
    field("category", false, &["category", "type", "transaction_type"]),
    field("payment_method", false, &["payment_method", "method", "payment_type", "tender"]),
];

const VISIT_FIELDS: &[DestinationField] = &[
    field("email", true, &["email", "email_address", "member_email"]),
    field("visit_date", false, &["visit_date", "date", "check_in", "checkin_date", "visited_at"]),
    field("location", false, &["location", "site", "branch", "venue"]),
    field("duration_minutes", false, &["duration_minutes", "duration", "minutes"]),
    field("notes", false, &["notes", "note", "comments"]),
];

/// 目标表字段定义（custom 无固定字段）
pub fn destination_fields(destination: DestinationType) -> &'static [DestinationField] {
    match destination {
        DestinationType::Members => MEMBER_FIELDS,
        DestinationType::Transactions => TRANSACTION_FIELDS,
        DestinationType::Visits => VISIT_FIELDS,
        DestinationType::Custom => &[],
    }
}
