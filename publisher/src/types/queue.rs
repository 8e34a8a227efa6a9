use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::types::announcement::AnnouncementType;

/// Logical queue partitions. Announcement queues feed the batch accumulator, the
/// batch queue feeds the announcer and the publish queue feeds the publishing service.
#[derive(
    Display, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumIter, EnumString, Hash, Serialize, Deserialize,
)]
pub enum QueueType {
    #[strum(serialize = "broadcastQueue")]
    #[serde(rename = "broadcastQueue")]
    Broadcast,
    #[strum(serialize = "replyQueue")]
    #[serde(rename = "replyQueue")]
    Reply,
    #[strum(serialize = "reactionQueue")]
    #[serde(rename = "reactionQueue")]
    Reaction,
    #[strum(serialize = "updateQueue")]
    #[serde(rename = "updateQueue")]
    Update,
    #[strum(serialize = "profileQueue")]
    #[serde(rename = "profileQueue")]
    Profile,
    #[strum(serialize = "tombstoneQueue")]
    #[serde(rename = "tombstoneQueue")]
    Tombstone,
    #[strum(serialize = "batchQueue")]
    #[serde(rename = "batchQueue")]
    BatchAnnouncement,
    #[strum(serialize = "publishQueue")]
    #[serde(rename = "publishQueue")]
    Publish,
}

impl QueueType {
    pub const ANNOUNCEMENT_QUEUES: [QueueType; 6] = [
        QueueType::Broadcast,
        QueueType::Reply,
        QueueType::Reaction,
        QueueType::Update,
        QueueType::Profile,
        QueueType::Tombstone,
    ];

    /// Announcement type accumulated in this queue, if it is a batching queue
    pub fn announcement_type(&self) -> Option<AnnouncementType> {
        match self {
            QueueType::Broadcast => Some(AnnouncementType::Broadcast),
            QueueType::Reply => Some(AnnouncementType::Reply),
            QueueType::Reaction => Some(AnnouncementType::Reaction),
            QueueType::Update => Some(AnnouncementType::Update),
            QueueType::Profile => Some(AnnouncementType::Profile),
            QueueType::Tombstone => Some(AnnouncementType::Tombstone),
            QueueType::BatchAnnouncement | QueueType::Publish => None,
        }
    }

    pub fn for_announcement(announcement_type: AnnouncementType) -> Self {
        match announcement_type {
            AnnouncementType::Broadcast => QueueType::Broadcast,
            AnnouncementType::Reply => QueueType::Reply,
            AnnouncementType::Reaction => QueueType::Reaction,
            AnnouncementType::Update => QueueType::Update,
            AnnouncementType::Profile => QueueType::Profile,
            AnnouncementType::Tombstone => QueueType::Tombstone,
        }
    }
}
