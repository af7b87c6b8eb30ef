use serde::Deserialize;

fn default_days() -> u32 {
    30
}

/// One row of the account table in the settings file. Trusted as validated
/// once `Settings::load` has accepted the file.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    #[serde(default = "default_days")]
    pub inbox_days: u32,
    #[serde(default = "default_days")]
    pub sent_days: u32,
    #[serde(default = "default_days")]
    pub deleted_days: u32,
    #[serde(default)]
    pub archive_body: bool,
    #[serde(default)]
    pub require_attachment: bool,
    #[serde(default)]
    pub unread_only: bool,
}

/// Relocation state of a fetched message. A record starts out `Fetched`;
/// the move stage flips it to `Relocated` exactly once, capturing the id
/// the service assigned in the destination folder. A record that never
/// relocates has no valid delete target in the trash folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveState {
    Fetched,
    Relocated { new_id: String },
}

/// Metadata of one message within one page's processing window. Created
/// when a fetch page is parsed, archived before any destructive call,
/// discarded once the page is done.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub original_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    /// ISO-8601, as reported by the service.
    pub received_at: String,
    /// Plain text, HTML already stripped. Empty when body archival is off.
    pub body: String,
    pub state: MoveState,
}

impl MessageRecord {
    pub fn mark_relocated(&mut self, new_id: String) {
        self.state = MoveState::Relocated { new_id };
    }

    /// The id the delete batch must use. Folders that skip the move stage
    /// delete by the original id; everything else requires a relocation.
    pub fn delete_target(&self, move_before_delete: bool) -> Option<&str> {
        if move_before_delete {
            match &self.state {
                MoveState::Relocated { new_id } => Some(new_id),
                MoveState::Fetched => None,
            }
        } else {
            Some(&self.original_id)
        }
    }
}

/// One page of a filtered folder listing, plus the continuation token
/// (for Graph, the verbatim `@odata.nextLink`) when more pages follow.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub records: Vec<MessageRecord>,
    pub next_page_token: Option<String>,
}

/// Server-side filter for a folder listing. All present criteria are
/// AND-combined and evaluated remotely, never client-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    /// ISO-8601 lower bound on receivedDateTime.
    pub received_after: String,
    pub require_attachment: bool,
    pub unread_only: bool,
    pub include_body: bool,
    pub page_size: u32,
}

/// One tagged sub-request of a batched move call. The token is the
/// originalId: unique within a page and directly correlatable back to the
/// record when the response comes in.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub token: String,
    pub message_id: String,
    pub destination: String,
}

/// One tagged sub-request of a batched permanent-delete call. Tokens are
/// freshly generated per batch; nothing downstream needs to correlate a
/// delete back to a business id.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub token: String,
    pub message_id: String,
    pub permanent: bool,
}

/// Per-item result of a batched call, keyed by the caller's token.
/// Response order is not guaranteed to match request order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub token: String,
    pub status: u16,
    pub body: serde_json::Value,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The three mailbox folders a sweep touches, in processing order.
/// Deleted Items is the only folder where messages already sit in the
/// trash location, so it deletes directly without a preceding move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    Inbox,
    SentItems,
    DeletedItems,
}

impl Folder {
    pub const ORDER: [Folder; 3] = [Folder::Inbox, Folder::SentItems, Folder::DeletedItems];

    /// Well-known folder name in the mail service.
    pub fn remote_name(self) -> &'static str {
        match self {
            Folder::Inbox => "inbox",
            Folder::SentItems => "sentitems",
            Folder::DeletedItems => "deleteditems",
        }
    }

    pub fn move_before_delete(self) -> bool {
        !matches!(self, Folder::DeletedItems)
    }

    pub fn retention_days(self, config: &AccountConfig) -> u32 {
        match self {
            Folder::Inbox => config.inbox_days,
            Folder::SentItems => config.sent_days,
            Folder::DeletedItems => config.deleted_days,
        }
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Folder::Inbox => "Inbox",
            Folder::SentItems => "SentItems",
            Folder::DeletedItems => "DeletedItems",
        };
        write!(f, "{name}")
    }
}

/// Aggregate outcome of one delete batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteCounts {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Per-account run summary: successfully deleted messages per folder.
#[derive(Debug, Clone, Default)]
pub struct AccountSummary {
    pub email: String,
    pub inbox: usize,
    pub sent_items: usize,
    pub deleted_items: usize,
}

impl AccountSummary {
    pub fn total(&self) -> usize {
        self.inbox + self.sent_items + self.deleted_items
    }

    pub fn record(&mut self, folder: Folder, deleted: usize) {
        match folder {
            Folder::Inbox => self.inbox += deleted,
            Folder::SentItems => self.sent_items += deleted,
            Folder::DeletedItems => self.deleted_items += deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: MoveState) -> MessageRecord {
        MessageRecord {
            original_id: "orig".into(),
            from: "a@x.com".into(),
            to: vec!["b@x.com".into()],
            subject: "s".into(),
            received_at: "2026-01-01T00:00:00Z".into(),
            body: String::new(),
            state,
        }
    }

    #[test]
    fn fetched_record_has_no_delete_target_after_move_folder() {
        let rec = record(MoveState::Fetched);
        assert_eq!(rec.delete_target(true), None);
    }

    #[test]
    fn relocated_record_deletes_by_new_id() {
        let mut rec = record(MoveState::Fetched);
        rec.mark_relocated("n1".into());
        assert_eq!(rec.delete_target(true), Some("n1"));
    }

    #[test]
    fn delete_only_folder_uses_original_id() {
        let rec = record(MoveState::Fetched);
        assert_eq!(rec.delete_target(false), Some("orig"));
    }

    #[test]
    fn folder_order_skips_move_only_for_deleted_items() {
        let moved: Vec<bool> = Folder::ORDER
            .iter()
            .map(|f| f.move_before_delete())
            .collect();
        assert_eq!(moved, vec![true, true, false]);
    }
}
