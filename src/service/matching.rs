//! Matching Service: moves unclaimed allocations to a newly verified artist.

use super::locks::ArtistLocks;
use super::retry::with_contention_retry;
use super::LedgerError;
use crate::config::Config;
use crate::db::Repository;
use crate::domain::{ArtistId, Money, NameFingerprint};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub artist_id: ArtistId,
    /// Zero when nothing matched, which is not an error.
    pub matched_count: usize,
    pub matched_total: Money,
    pub balance: Money,
}

#[derive(Debug, Clone)]
pub struct MatchingService {
    repo: Arc<Repository>,
    locks: ArtistLocks,
    retry_window: Duration,
}

impl MatchingService {
    pub fn new(repo: Arc<Repository>, locks: ArtistLocks, config: &Config) -> Self {
        Self {
            repo,
            locks,
            retry_window: config.contention_retry_window(),
        }
    }

    /// Re-key every pending unclaimed record whose fingerprint equals the
    /// candidate name's, or whose channel equals `channel_id`, to `artist_id`.
    ///
    /// Matched records stay pending and their total is credited to the
    /// artist's balance. Records already re-keyed are never matched again, so
    /// repeating the call is safe.
    pub async fn match_unclaimed(
        &self,
        artist_id: &ArtistId,
        artist_name: &str,
        channel_id: Option<&str>,
    ) -> Result<MatchOutcome, LedgerError> {
        if artist_id.is_blank() {
            return Err(LedgerError::InvalidInput(
                "artistId must not be empty".to_string(),
            ));
        }
        let fingerprint = NameFingerprint::from_name(artist_name);
        let channel_id = channel_id.map(str::trim).filter(|c| !c.is_empty());
        if fingerprint.is_empty() && channel_id.is_none() {
            return Err(LedgerError::InvalidMatchCandidate);
        }
        let display_name = Some(artist_name.trim()).filter(|_| !fingerprint.is_empty());

        let _guard = self.locks.acquire_one(artist_id).await;
        let fingerprint_ref = &fingerprint;
        let outcome = with_contention_retry(self.retry_window, "match", || {
            self.write_match(artist_id, fingerprint_ref, display_name, channel_id)
        })
        .await?;

        info!(
            artist_id = %artist_id,
            fingerprint = %fingerprint,
            channel_id = channel_id.unwrap_or(""),
            matched = outcome.matched_count,
            total = %outcome.matched_total,
            "Unclaimed allocations matched"
        );
        Ok(outcome)
    }

    async fn write_match(
        &self,
        artist_id: &ArtistId,
        fingerprint: &NameFingerprint,
        display_name: Option<&str>,
        channel_id: Option<&str>,
    ) -> Result<MatchOutcome, LedgerError> {
        let mut tx = self.repo.begin_ledger_tx().await?;
        let account = tx.lock_account(artist_id).await?;
        tx.set_profile(artist_id, display_name, channel_id).await?;

        let candidates = tx.unclaimed_matches(fingerprint, channel_id).await?;
        let seqs: Vec<i64> = candidates.iter().map(|c| c.seq).collect();
        let matched_total = Money::checked_sum(candidates.iter().map(|c| c.amount))?;

        let rekeyed = tx.rekey_to_artist(&seqs, artist_id).await?;
        if rekeyed != seqs.len() as u64 {
            return Err(LedgerError::Inconsistent(format!(
                "re-keyed {} of {} matched records",
                rekeyed,
                seqs.len()
            )));
        }
        if !matched_total.is_zero() {
            tx.credit_account(artist_id, matched_total).await?;
        }
        tx.commit().await?;

        Ok(MatchOutcome {
            artist_id: artist_id.clone(),
            matched_count: seqs.len(),
            matched_total,
            balance: account.balance.add(matched_total)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{
        BidderId, MediaId, MediaOwnership, OwnershipEntry, Share, TimeMs, TipEvent, TipId,
    };
    use crate::engine::OwnershipResolver;
    use crate::service::EscrowLedger;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Fixture {
        ledger: EscrowLedger,
        matching: MatchingService,
        repo: Arc<Repository>,
        _temp: TempDir,
    }

    async fn setup() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let mut env = HashMap::new();
        env.insert("DATABASE_PATH".to_string(), db_path);
        let config = Config::from_env_map(env).unwrap();
        let locks = ArtistLocks::new();

        Fixture {
            ledger: EscrowLedger::new(
                repo.clone(),
                OwnershipResolver::new(repo.clone()),
                locks.clone(),
                &config,
            ),
            matching: MatchingService::new(repo.clone(), locks, &config),
            repo,
            _temp: temp_dir,
        }
    }

    async fn tip_unclaimed(f: &Fixture, tip_id: &str, media: MediaOwnership, amount: u32) {
        let media_id = media.media_id.clone();
        f.repo.register_media(&media).await.unwrap();
        f.ledger
            .allocate(TipEvent::new(
                TipId::new(tip_id),
                media_id,
                BidderId::new("b"),
                Money::from_pence(amount),
                TimeMs::new(1),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_match_by_name_then_rerun_is_empty() {
        let f = setup().await;
        tip_unclaimed(&f, "t1", MediaOwnership::new(MediaId::new("m1"), "The Newcomers"), 1000)
            .await;
        let artist = ArtistId::new("artist-9");

        let first = f
            .matching
            .match_unclaimed(&artist, "  the newcomers!", None)
            .await
            .unwrap();
        assert_eq!(first.matched_count, 1);
        assert_eq!(first.matched_total, Money::from_pence(700));
        assert_eq!(first.balance, Money::from_pence(700));

        let second = f
            .matching
            .match_unclaimed(&artist, "The Newcomers", None)
            .await
            .unwrap();
        assert_eq!(second.matched_count, 0);
        assert_eq!(second.matched_total, Money::ZERO);

        let account = f.ledger.account(&artist).await.unwrap();
        assert_eq!(account.balance, Money::from_pence(700));
        assert_eq!(account.total_escrow_earned, Money::from_pence(700));
        assert_eq!(account.display_name.as_deref(), Some("the newcomers!"));
        assert!(f.ledger.audit(&artist).await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let f = setup().await;
        tip_unclaimed(&f, "t1", MediaOwnership::new(MediaId::new("m1"), "Same Name"), 1000).await;

        let a = f
            .matching
            .match_unclaimed(&ArtistId::new("a"), "Same Name", None)
            .await
            .unwrap();
        let b = f
            .matching
            .match_unclaimed(&ArtistId::new("b"), "Same Name", None)
            .await
            .unwrap();
        assert_eq!(a.matched_count, 1);
        assert_eq!(b.matched_count, 0);
    }

    #[tokio::test]
    async fn test_match_by_channel() {
        let f = setup().await;
        let media = MediaOwnership::new(MediaId::new("m1"), "Stage Name").with_channel("UC123");
        tip_unclaimed(&f, "t1", media, 2000).await;

        let outcome = f
            .matching
            .match_unclaimed(&ArtistId::new("a"), "Legal Name", Some("UC123"))
            .await
            .unwrap();
        assert_eq!(outcome.matched_count, 1);
        assert_eq!(outcome.matched_total, Money::from_pence(1400));
    }

    #[tokio::test]
    async fn test_verified_co_owner_unaffected() {
        let f = setup().await;
        let media = MediaOwnership::new(MediaId::new("m1"), "Duo")
            .with_entry(OwnershipEntry::verified(
                ArtistId::new("known"),
                Share::from_str_canonical("0.5").unwrap(),
            ))
            .with_entry(OwnershipEntry::unverified(
                "Guest",
                Share::from_str_canonical("0.5").unwrap(),
            ));
        tip_unclaimed(&f, "t1", media, 1000).await;

        let outcome = f
            .matching
            .match_unclaimed(&ArtistId::new("guest-id"), "guest", None)
            .await
            .unwrap();
        assert_eq!(outcome.matched_total, Money::from_pence(350));
        assert_eq!(
            f.ledger.balance(&ArtistId::new("known")).await.unwrap(),
            Money::from_pence(350)
        );
    }

    #[tokio::test]
    async fn test_symbol_only_artist_name_is_claimable() {
        let f = setup().await;
        tip_unclaimed(&f, "t1", MediaOwnership::new(MediaId::new("m1"), "!!!"), 1000).await;

        let view = f.ledger.unclaimed(Some("!!!"), None).await.unwrap();
        assert_eq!(view.total, Money::from_pence(700));
        assert_eq!(view.records[0].owner.key(), "!!!");

        let artist = ArtistId::new("chk-chk-chk");
        let info = f.ledger.escrow_info(&artist, None, Some("!!!")).await.unwrap();
        assert_eq!(info.unclaimed_candidates.len(), 1);
        assert_eq!(info.unclaimed_candidates[0].total, Money::from_pence(700));

        let outcome = f
            .matching
            .match_unclaimed(&artist, " !!! ", None)
            .await
            .unwrap();
        assert_eq!(outcome.matched_count, 1);
        assert_eq!(outcome.balance, Money::from_pence(700));
        assert!(f.ledger.unclaimed(Some("!!!"), None).await.unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn test_empty_candidate_rejected() {
        let f = setup().await;
        let err = f
            .matching
            .match_unclaimed(&ArtistId::new("a"), "   ", Some("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidMatchCandidate));
    }
}
