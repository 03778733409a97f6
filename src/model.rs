use serde::{Deserialize, Serialize};

/// Embedded JSON column shapes. These are decoded with serde at the read
/// boundary; a malformed column is a decode error, never a blind cast.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub user_id: Option<String>,
    pub nickname: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MemberRole::Owner),
            "admin" => Some(MemberRole::Admin),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub user_id: String,
    pub role: MemberRole,
    #[serde(default)]
    pub joined_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMessage {
    pub id: String,
    pub sender_type: SenderType,
    pub content: String,
    pub created_at: String,
}

pub fn decode_questions(raw: &str) -> Result<Vec<Question>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn decode_participants(raw: &str) -> Result<Vec<Participant>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn decode_members(raw: &str) -> Result<Vec<GroupMember>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn decode_messages(raw: &str) -> Result<Vec<ReportMessage>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_participants_with_optional_fields() {
        let raw = r#"[
            {"userId":"u1","nickname":"ada","score":80,"avatar":"a.png"},
            {"nickname":"guest","score":60}
        ]"#;
        let parts = decode_participants(raw).expect("decode participants");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].user_id.as_deref(), Some("u1"));
        assert!(parts[1].user_id.is_none());
        assert_eq!(parts[1].score, 60.0);
    }

    #[test]
    fn rejects_malformed_member_list() {
        // role must be one of owner/admin/member
        let raw = r#"[{"userId":"u1","role":"superuser"}]"#;
        assert!(decode_members(raw).is_err());
    }

    #[test]
    fn member_role_round_trips_through_str() {
        for role in [MemberRole::Owner, MemberRole::Admin, MemberRole::Member] {
            assert_eq!(MemberRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MemberRole::parse("moderator"), None);
    }
}
