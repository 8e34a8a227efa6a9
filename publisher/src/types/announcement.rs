use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// DSNP announcement types with their on-chain numeric codes
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnouncementType {
    Tombstone = 0,
    Broadcast = 2,
    Reply = 3,
    Reaction = 4,
    Profile = 5,
    Update = 6,
}

impl AnnouncementType {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Name of the DSNP schema registered for this announcement type
    pub fn schema_name(self) -> &'static str {
        match self {
            AnnouncementType::Tombstone => "tombstone",
            AnnouncementType::Broadcast => "broadcast",
            AnnouncementType::Reply => "reply",
            AnnouncementType::Reaction => "reaction",
            AnnouncementType::Profile => "profile",
            AnnouncementType::Update => "update",
        }
    }
}

/// A single cell of a batch row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Int(i64),
    UInt(u64),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastAnnouncement {
    pub from_id: u64,
    pub content_hash: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyAnnouncement {
    pub from_id: u64,
    pub content_hash: String,
    pub in_reply_to: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionAnnouncement {
    pub from_id: u64,
    pub emoji: String,
    pub in_reply_to: String,
    pub apply: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAnnouncement {
    pub from_id: u64,
    pub content_hash: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnouncement {
    pub from_id: u64,
    pub content_hash: String,
    pub target_announcement_type: AnnouncementType,
    pub target_content_hash: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TombstoneAnnouncement {
    pub from_id: u64,
    pub target_announcement_type: AnnouncementType,
    pub target_content_hash: String,
}

/// Announcement accepted by one of the batching queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Announcement {
    Broadcast(BroadcastAnnouncement),
    Reply(ReplyAnnouncement),
    Reaction(ReactionAnnouncement),
    Profile(ProfileAnnouncement),
    Update(UpdateAnnouncement),
    Tombstone(TombstoneAnnouncement),
}

impl Announcement {
    pub fn announcement_type(&self) -> AnnouncementType {
        match self {
            Announcement::Broadcast(_) => AnnouncementType::Broadcast,
            Announcement::Reply(_) => AnnouncementType::Reply,
            Announcement::Reaction(_) => AnnouncementType::Reaction,
            Announcement::Profile(_) => AnnouncementType::Profile,
            Announcement::Update(_) => AnnouncementType::Update,
            Announcement::Tombstone(_) => AnnouncementType::Tombstone,
        }
    }

    pub fn from_id(&self) -> u64 {
        match self {
            Announcement::Broadcast(a) => a.from_id,
            Announcement::Reply(a) => a.from_id,
            Announcement::Reaction(a) => a.from_id,
            Announcement::Profile(a) => a.from_id,
            Announcement::Update(a) => a.from_id,
            Announcement::Tombstone(a) => a.from_id,
        }
    }

    /// Value of the DSNP column `name` for this announcement, `None` if the
    /// announcement type has no such column.
    pub fn column(&self, name: &str) -> Option<ColumnValue> {
        let text = |value: &String| Some(ColumnValue::Text(value.clone()));
        match (name, self) {
            ("announcementType", _) => Some(ColumnValue::Int(self.announcement_type().code() as i64)),
            ("fromId", _) => Some(ColumnValue::UInt(self.from_id())),
            ("contentHash", Announcement::Broadcast(a)) => text(&a.content_hash),
            ("contentHash", Announcement::Reply(a)) => text(&a.content_hash),
            ("contentHash", Announcement::Profile(a)) => text(&a.content_hash),
            ("contentHash", Announcement::Update(a)) => text(&a.content_hash),
            ("url", Announcement::Broadcast(a)) => text(&a.url),
            ("url", Announcement::Reply(a)) => text(&a.url),
            ("url", Announcement::Profile(a)) => text(&a.url),
            ("url", Announcement::Update(a)) => text(&a.url),
            ("inReplyTo", Announcement::Reply(a)) => text(&a.in_reply_to),
            ("inReplyTo", Announcement::Reaction(a)) => text(&a.in_reply_to),
            ("emoji", Announcement::Reaction(a)) => text(&a.emoji),
            ("apply", Announcement::Reaction(a)) => Some(ColumnValue::UInt(a.apply as u64)),
            ("targetAnnouncementType", Announcement::Update(a)) => {
                Some(ColumnValue::Int(a.target_announcement_type.code() as i64))
            }
            ("targetAnnouncementType", Announcement::Tombstone(a)) => {
                Some(ColumnValue::Int(a.target_announcement_type.code() as i64))
            }
            ("targetContentHash", Announcement::Update(a)) => text(&a.target_content_hash),
            ("targetContentHash", Announcement::Tombstone(a)) => text(&a.target_content_hash),
            _ => None,
        }
    }
}
