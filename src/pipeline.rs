//! The sweep pipeline: paginated fetch, archive, batched move, batched
//! permanent delete, with per-item bookkeeping.
//!
//! Everything is page-scoped: a page's records are fetched, archived,
//! moved and deleted before the next continuation token is followed, so
//! memory stays bounded to one page and continuation tokens never go
//! stale. Item failures inside a batch are logged and absorbed; only
//! envelope and query failures abort a folder, and nothing short of a
//! config or auth problem aborts the run.

use crate::archive::ArchiveSink;
use crate::config::ArchivePolicy;
use crate::error::{Error, Result};
use crate::graph::MailService;
use crate::models::{
    AccountConfig, AccountSummary, BatchOutcome, DeleteCounts, DeleteRequest, Folder,
    MessageQuery, MessageRecord, MoveRequest,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const TRASH_FOLDER: &str = "deleteditems";

pub struct Pipeline<'a, M, A> {
    mail: &'a M,
    archive: &'a A,
    archive_policy: ArchivePolicy,
    page_size: u32,
}

impl<'a, M: MailService, A: ArchiveSink> Pipeline<'a, M, A> {
    pub fn new(mail: &'a M, archive: &'a A, archive_policy: ArchivePolicy, page_size: u32) -> Self {
        Self {
            mail,
            archive,
            archive_policy,
            page_size,
        }
    }

    /// Sweeps all folders of one account in policy order. A folder that
    /// fails is logged and skipped; the summary always comes back.
    pub async fn run_account(&self, config: &AccountConfig) -> AccountSummary {
        let started = Instant::now();
        let mut summary = AccountSummary {
            email: config.email.clone(),
            ..Default::default()
        };

        for folder in Folder::ORDER {
            match self.process_folder(config, folder).await {
                Ok(deleted) => summary.record(folder, deleted),
                Err(e) => {
                    error!(account = %config.email, %folder, error = %e, "folder processing aborted");
                }
            }
        }

        info!(
            account = %summary.email,
            inbox = summary.inbox,
            sent_items = summary.sent_items,
            deleted_items = summary.deleted_items,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "account swept"
        );
        summary
    }

    /// Drives the pagination for one folder. Returns the number of
    /// messages permanently deleted.
    async fn process_folder(&self, config: &AccountConfig, folder: Folder) -> Result<usize> {
        let query = retention_query(config, folder, self.page_size, Utc::now());
        debug!(
            account = %config.email,
            %folder,
            received_after = %query.received_after,
            "starting folder sweep"
        );

        let mut deleted_total = 0;
        let mut page_token: Option<String> = None;
        let mut page_no = 0u32;

        loop {
            page_no += 1;
            let page = self
                .mail
                .list_page(
                    &config.email,
                    folder.remote_name(),
                    &query,
                    page_token.as_deref(),
                )
                .await?;
            if page.records.is_empty() {
                debug!(account = %config.email, %folder, page = page_no, "empty page, folder done");
                break;
            }
            debug!(
                account = %config.email,
                %folder,
                page = page_no,
                count = page.records.len(),
                "fetched page"
            );
            let mut records = page.records;

            // Metadata must be on disk before anything destructive
            // happens to this page.
            if let Err(e) = self.archive.append_records(&config.email, &records).await {
                match self.archive_policy {
                    ArchivePolicy::Advisory => {
                        warn!(account = %config.email, %folder, error = %e, "archive write failed, deleting anyway per policy");
                    }
                    ArchivePolicy::Blocking => {
                        warn!(account = %config.email, %folder, error = %e, "archive write failed, aborting folder per policy");
                        return Err(Error::ArchiveRefused {
                            account: config.email.clone(),
                        });
                    }
                }
            }

            if folder.move_before_delete() {
                self.move_stage(&config.email, &mut records).await?;
            }

            let counts = self
                .delete_stage(&config.email, &records, folder.move_before_delete())
                .await?;
            deleted_total += counts.succeeded;

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(deleted_total)
    }

    /// Batched move into the trash folder. Each sub-request is tagged with
    /// the message's originalId; a successful item response carries the id
    /// the service assigned in the destination folder, which becomes the
    /// record's delete target. Item failures leave the record un-relocated.
    async fn move_stage(&self, account: &str, records: &mut [MessageRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let requests: Vec<MoveRequest> = records
            .iter()
            .map(|record| MoveRequest {
                token: record.original_id.clone(),
                message_id: record.original_id.clone(),
                destination: TRASH_FOLDER.to_string(),
            })
            .collect();

        debug!(account, count = requests.len(), "issuing move batch");
        let outcomes = self.mail.batch_move(account, &requests).await?;
        // Correlate strictly by token; response order is not trustworthy.
        let mut by_token: HashMap<String, BatchOutcome> = outcomes
            .into_iter()
            .map(|outcome| (outcome.token.clone(), outcome))
            .collect();

        let mut moved = 0usize;
        let mut failed = 0usize;
        for record in records.iter_mut() {
            match by_token.remove(&record.original_id) {
                Some(outcome) if outcome.is_success() => {
                    match outcome.body.get("id").and_then(|id| id.as_str()) {
                        Some(new_id) => {
                            debug!(original = %record.original_id, new = new_id, "message relocated");
                            record.mark_relocated(new_id.to_string());
                            moved += 1;
                        }
                        None => {
                            failed += 1;
                            warn!(
                                message = %record.original_id,
                                body = %outcome.body,
                                "move response lacked a new id"
                            );
                        }
                    }
                }
                Some(outcome) => {
                    failed += 1;
                    warn!(
                        message = %record.original_id,
                        status = outcome.status,
                        body = %outcome.body,
                        "failed to move message"
                    );
                }
                None => {
                    failed += 1;
                    warn!(message = %record.original_id, "no response for move request");
                }
            }
        }
        info!(account, attempted = records.len(), moved, failed, "move batch complete");
        Ok(())
    }

    /// Batched permanent delete. Targets are the relocated ids (or the
    /// original ids when the folder is delete-only); tokens are fresh
    /// UUIDs since nothing correlates deletes back to a business id.
    async fn delete_stage(
        &self,
        account: &str,
        records: &[MessageRecord],
        move_before_delete: bool,
    ) -> Result<DeleteCounts> {
        let requests: Vec<DeleteRequest> = records
            .iter()
            .filter_map(|record| record.delete_target(move_before_delete))
            .map(|target| DeleteRequest {
                token: Uuid::new_v4().to_string(),
                message_id: target.to_string(),
                permanent: true,
            })
            .collect();
        if requests.is_empty() {
            return Ok(DeleteCounts::default());
        }

        debug!(account, count = requests.len(), "issuing delete batch");
        let outcomes = self.mail.batch_delete(account, &requests).await?;
        let by_token: HashMap<String, BatchOutcome> = outcomes
            .into_iter()
            .map(|outcome| (outcome.token.clone(), outcome))
            .collect();

        let mut counts = DeleteCounts {
            attempted: requests.len(),
            ..Default::default()
        };
        for request in &requests {
            match by_token.get(&request.token) {
                Some(outcome) if outcome.is_success() => counts.succeeded += 1,
                Some(outcome) => {
                    counts.failed += 1;
                    warn!(
                        message = %request.message_id,
                        status = outcome.status,
                        body = %outcome.body,
                        "failed to delete message"
                    );
                }
                None => {
                    counts.failed += 1;
                    warn!(message = %request.message_id, "no response for delete request");
                }
            }
        }
        info!(
            account,
            attempted = counts.attempted,
            succeeded = counts.succeeded,
            failed = counts.failed,
            "delete batch complete"
        );
        Ok(counts)
    }
}

fn retention_query(
    config: &AccountConfig,
    folder: Folder,
    page_size: u32,
    now: DateTime<Utc>,
) -> MessageQuery {
    let threshold = now - Duration::days(i64::from(folder.retention_days(config)));
    MessageQuery {
        received_after: threshold.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        require_attachment: config.require_attachment,
        unread_only: config.unread_only,
        include_body: config.archive_body,
        page_size,
    }
}
