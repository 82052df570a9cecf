//! Settlement coordinator
//!
//! One wager runs `Validated -> OutcomeResolved -> LedgerApplied` where the
//! last step is a single store commit carrying the entries, the game result
//! and any hand state. Anything failing before that commit leaves no trace.

mod random;
mod retry;

pub use random::{EntropySource, RandomSource, SeededSource};
pub use retry::RetryPolicy;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{
    Credits, DEFAULT_COMMIT_TIMEOUT_MS, DEFAULT_RETRY_BACKOFF_BASE_MS, DEFAULT_RETRY_BACKOFF_MAX_MS,
    DEFAULT_SETTLEMENT_MAX_ATTEMPTS,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::catalog::{BlackjackRules, GameRules};
use crate::domain::{BlackjackHand, GameDefinition, GameId, GameKind, GameResult, ResultClass};
use crate::errors::{AppError, Result};
use crate::ledger::{AccountLedger, LedgerEntryDraft};
use crate::outcome::blackjack::{self, HandAction, RoundResolution, RoundStage};
use crate::outcome::cards::{is_natural, Card};
use crate::outcome::slots::Grid;
use crate::outcome::{self, BlackjackView, Multiplier, Outcome, OutcomePayload, Resolution};
use crate::repository::{CommitReceipt, GameCatalog, HandWrite, LedgerCommit, LedgerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    pub retry: RetryPolicy,
    pub commit_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: DEFAULT_SETTLEMENT_MAX_ATTEMPTS,
                backoff_base: Duration::from_millis(DEFAULT_RETRY_BACKOFF_BASE_MS),
                backoff_max: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MAX_MS),
            },
            commit_timeout: Duration::from_millis(DEFAULT_COMMIT_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotWagerReceipt {
    pub result_id: Uuid,
    pub grid: Grid,
    pub winning_symbol: Option<String>,
    pub match_count: u32,
    pub multiplier: Multiplier,
    pub classification: ResultClass,
    pub stake: Credits,
    pub payout: Credits,
    pub new_balance: Credits,
}

/// How a finished hand paid out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackjackSettlement {
    pub result_id: Uuid,
    pub resolution: RoundResolution,
    pub classification: ResultClass,
    pub dealer_cards: Vec<Card>,
    pub dealer_hand_value: u32,
    pub payout: Credits,
}

/// State of a blackjack hand after a deal or an action
///
/// `hand_id` is absent when the deal itself settled the round. The dealer's
/// hole card only appears once `settlement` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackjackHandReceipt {
    pub hand_id: Option<Uuid>,
    pub player_cards: Vec<Card>,
    pub dealer_upcard: Option<Card>,
    pub player_hand_value: u32,
    pub is_natural_win: bool,
    pub state: RoundStage,
    pub stake: Credits,
    pub settlement: Option<BlackjackSettlement>,
    pub new_balance: Credits,
}

pub struct SettlementCoordinator {
    catalog: Arc<dyn GameCatalog>,
    store: Arc<dyn LedgerStore>,
    ledger: AccountLedger,
    rng_source: Arc<dyn RandomSource>,
    config: SettlementConfig,
}

fn validate_stake(game: &GameDefinition, stake: Credits) -> Result<()> {
    if !stake.is_positive() || stake < game.min_bet || stake > game.max_bet {
        return Err(AppError::InvalidStake {
            stake,
            min: game.min_bet,
            max: game.max_bet,
        });
    }
    Ok(())
}

fn blackjack_rules(game: &GameDefinition) -> Result<&BlackjackRules> {
    match &game.rules {
        GameRules::Blackjack(rules) => Ok(rules),
        _ => Err(AppError::UnsupportedGame {
            game_id: game.id,
            requested: "blackjack",
        }),
    }
}

fn payload_json(payload: &OutcomePayload) -> Result<serde_json::Value> {
    serde_json::to_value(payload).map_err(|e| AppError::Internal(e.into()))
}

fn game_result(
    account_id: &str,
    game: &GameDefinition,
    commit_id: Uuid,
    hand_id: Option<Uuid>,
    stake: Credits,
    payout: Credits,
    outcome: &Outcome,
) -> Result<GameResult> {
    Ok(GameResult {
        result_id: Uuid::new_v4(),
        account_id: account_id.to_string(),
        game_id: game.id,
        commit_id,
        hand_id,
        stake,
        payout,
        outcome: payload_json(&outcome.payload)?,
        classification: outcome.classification,
        created_at: Utc::now(),
    })
}

fn settlement_of(result: &GameResult, view: &BlackjackView) -> Option<BlackjackSettlement> {
    Some(BlackjackSettlement {
        result_id: result.result_id,
        resolution: view.resolution?,
        classification: result.classification,
        dealer_cards: view.dealer_cards.clone(),
        dealer_hand_value: view.dealer_value.map_or(0, |value| value.total),
        payout: result.payout,
    })
}

fn hand_receipt(
    hand_id: Option<Uuid>,
    view: &BlackjackView,
    stake: Credits,
    settlement: Option<BlackjackSettlement>,
    new_balance: Credits,
) -> BlackjackHandReceipt {
    BlackjackHandReceipt {
        hand_id,
        player_cards: view.player_cards.clone(),
        dealer_upcard: view.dealer_cards.first().copied(),
        player_hand_value: view.player_value.total,
        is_natural_win: is_natural(&view.player_cards),
        state: view.stage,
        stake,
        settlement,
        new_balance,
    }
}

fn record_rejection(error: &AppError) {
    metrics::counter!("wagers_rejected_total", "code" => error.code().as_str()).increment(1);
}

impl SettlementCoordinator {
    pub fn new(
        catalog: Arc<dyn GameCatalog>,
        store: Arc<dyn LedgerStore>,
        rng_source: Arc<dyn RandomSource>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            catalog,
            ledger: AccountLedger::new(store.clone()),
            store,
            rng_source,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Load a playable game of the expected kind
    async fn load_game(&self, game_id: GameId, kind: GameKind) -> Result<GameDefinition> {
        let game = self
            .catalog
            .find_game(game_id)
            .await?
            .ok_or(AppError::UnknownGame(game_id))?;
        if !game.is_active {
            return Err(AppError::GameInactive(game_id));
        }
        if game.kind() != kind {
            return Err(AppError::UnsupportedGame {
                game_id,
                requested: kind.as_str(),
            });
        }
        Ok(game)
    }

    async fn resolve(&self, game: &GameDefinition) -> Result<Resolution> {
        let mut rng = self.rng_source.rng();
        outcome::resolve(game, &mut *rng)
    }

    /// Run `attempt` until it succeeds, fails for good, or the budget runs out
    async fn with_retry<T, F, Fut>(&self, account_id: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = self.config.retry;
        let mut n = 1;
        loop {
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(error) if policy.should_retry(n, &error) => {
                    let delay = policy.backoff(n);
                    metrics::counter!("settlement_conflicts_total").increment(1);
                    tracing::debug!(
                        account_id = %account_id,
                        attempt = n,
                        delay_ms = delay.as_millis() as u64,
                        "Settlement lost a version race, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    n += 1;
                }
                Err(error) => {
                    if error.is_retryable() {
                        tracing::warn!(account_id = %account_id, attempts = n, "Settlement retry budget exhausted");
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Commit under the configured timeout.
    ///
    /// The store call runs in its own task so a commit already in flight is
    /// never cut off mid-write. Past the deadline the coordinator waits one
    /// more timeout for that task to report; only then does it abort the task
    /// and look the commit up by id.
    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt> {
        let commit_id = commit.commit_id;
        let timeout = self.config.commit_timeout;
        let timeout_ms = timeout.as_millis() as u64;

        let store = self.store.clone();
        let mut task = tokio::spawn(async move { store.commit(commit).await });

        if let Ok(joined) = tokio::time::timeout(timeout, &mut task).await {
            return joined.map_err(|e| AppError::Internal(anyhow::anyhow!("commit task failed: {}", e)))?;
        }

        tracing::warn!(commit_id = %commit_id, timeout_ms, "Ledger commit timed out, waiting for it to finish");
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(receipt))) => {
                tracing::info!(commit_id = %commit_id, "Late ledger commit landed");
                Ok(receipt)
            }
            // A failed commit left no trace
            Ok(Ok(Err(error))) => {
                tracing::warn!(commit_id = %commit_id, error = %error, "Late ledger commit failed");
                Err(AppError::SettlementTimeout(timeout_ms))
            }
            Ok(Err(e)) => Err(AppError::Internal(anyhow::anyhow!("commit task failed: {}", e))),
            Err(_) => {
                task.abort();
                match self.store.find_commit(commit_id).await? {
                    Some(receipt) => Ok(receipt),
                    None => Err(AppError::SettlementTimeout(timeout_ms)),
                }
            }
        }
    }

    async fn observe<T>(&self, kind: &'static str, work: impl Future<Output = Result<T>>) -> Result<T> {
        let started = Instant::now();
        let result = work.await;
        metrics::histogram!("settlement_duration_seconds", "game" => kind).record(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => metrics::counter!("wagers_settled_total", "game" => kind).increment(1),
            Err(error) => record_rejection(error),
        }
        result
    }

    pub async fn resolve_slot_wager(&self, account_id: &str, game_id: GameId, stake: Credits) -> Result<SlotWagerReceipt> {
        let span = tracing::info_span!("slot_wager", account_id = %account_id, game_id, stake = %stake);
        self.observe("slots", self.slot_wager(account_id, game_id, stake))
            .instrument(span)
            .await
    }

    async fn slot_wager(&self, account_id: &str, game_id: GameId, stake: Credits) -> Result<SlotWagerReceipt> {
        let game = self.load_game(game_id, GameKind::Slots).await?;
        validate_stake(&game, stake)?;

        let outcome = match self.resolve(&game).await? {
            Resolution::Final(outcome) => outcome,
            Resolution::Pending(_) => {
                return Err(AppError::Internal(anyhow::anyhow!("slot round left pending")));
            }
        };
        let OutcomePayload::Slots(spin) = &outcome.payload else {
            return Err(AppError::Internal(anyhow::anyhow!("slot game produced a non-slot outcome")));
        };
        let payout = outcome.payout(stake)?;
        let symbols: String = spin.grid.iter().flatten().map(String::as_str).collect();

        let receipt = self
            .with_retry(account_id, |attempt| {
                let (game, outcome, symbols) = (&game, &outcome, &symbols);
                async move {
                    tracing::debug!(attempt, "Applying slot settlement");
                    let account = self.ledger.load(account_id).await?;

                    let mut drafts = vec![LedgerEntryDraft::bet(game.id, stake, format!("Slot spin - {}", symbols))?];
                    if payout.is_positive() {
                        drafts.push(LedgerEntryDraft::win(game.id, payout, format!("Slot win - {}", symbols)));
                    }

                    let commit = self.ledger.stage(&account, &drafts)?;
                    let result = game_result(account_id, game, commit.commit_id, None, stake, payout, outcome)?;
                    self.commit(commit.with_result(result)).await
                }
            })
            .await?;

        let result = receipt
            .result
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("slot commit {} carried no result", receipt.commit_id)))?;

        tracing::info!(
            result_id = %result.result_id,
            payout = %payout,
            new_balance = %receipt.new_balance,
            classification = result.classification.as_str(),
            "Slot wager settled"
        );

        Ok(SlotWagerReceipt {
            result_id: result.result_id,
            grid: spin.grid.clone(),
            winning_symbol: spin.winning_symbol.clone(),
            match_count: spin.match_count,
            multiplier: spin.multiplier,
            classification: result.classification,
            stake,
            payout,
            new_balance: receipt.new_balance,
        })
    }

    pub async fn resolve_blackjack_deal(
        &self,
        account_id: &str,
        game_id: GameId,
        stake: Credits,
    ) -> Result<BlackjackHandReceipt> {
        let span = tracing::info_span!("blackjack_deal", account_id = %account_id, game_id, stake = %stake);
        self.observe("blackjack", self.blackjack_deal(account_id, game_id, stake))
            .instrument(span)
            .await
    }

    async fn blackjack_deal(&self, account_id: &str, game_id: GameId, stake: Credits) -> Result<BlackjackHandReceipt> {
        let game = self.load_game(game_id, GameKind::Blackjack).await?;
        validate_stake(&game, stake)?;

        match self.resolve(&game).await? {
            Resolution::Final(outcome) => self.settle_at_deal(account_id, &game, stake, outcome).await,
            Resolution::Pending(round) => self.open_hand(account_id, &game, stake, round).await,
        }
    }

    /// A natural on either side settles the round in the deal's commit
    async fn settle_at_deal(
        &self,
        account_id: &str,
        game: &GameDefinition,
        stake: Credits,
        outcome: Outcome,
    ) -> Result<BlackjackHandReceipt> {
        let OutcomePayload::Blackjack(view) = &outcome.payload else {
            return Err(AppError::Internal(anyhow::anyhow!("blackjack game produced a non-card outcome")));
        };
        let payout = outcome.payout(stake)?;

        let receipt = self
            .with_retry(account_id, |_| {
                let outcome = &outcome;
                async move {
                    let account = self.ledger.load(account_id).await?;
                    let mut drafts = vec![LedgerEntryDraft::bet(game.id, stake, format!("Blackjack bet - {}", game.name))?];
                    if payout.is_positive() {
                        drafts.push(LedgerEntryDraft::win(game.id, payout, payout_description(game, outcome)));
                    }
                    let commit = self.ledger.stage(&account, &drafts)?;
                    let result = game_result(account_id, game, commit.commit_id, None, stake, payout, outcome)?;
                    self.commit(commit.with_result(result)).await
                }
            })
            .await?;

        let result = receipt
            .result
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("blackjack commit {} carried no result", receipt.commit_id)))?;

        tracing::info!(
            result_id = %result.result_id,
            resolution = ?view.resolution,
            payout = %payout,
            new_balance = %receipt.new_balance,
            "Blackjack round settled at the deal"
        );

        let settlement = settlement_of(&result, view);
        Ok(hand_receipt(None, view, stake, settlement, receipt.new_balance))
    }

    /// Debit the stake and store the hand for player actions
    async fn open_hand(
        &self,
        account_id: &str,
        game: &GameDefinition,
        stake: Credits,
        round: blackjack::BlackjackRound,
    ) -> Result<BlackjackHandReceipt> {
        let hand_id = Uuid::new_v4();

        let receipt = self
            .with_retry(account_id, |_| {
                let round = &round;
                async move {
                    let account = self.ledger.load(account_id).await?;
                    let drafts = [LedgerEntryDraft::bet(game.id, stake, format!("Blackjack bet - {}", game.name))?];
                    let now = Utc::now();
                    let hand = BlackjackHand {
                        hand_id,
                        account_id: account_id.to_string(),
                        game_id: game.id,
                        stake,
                        round: round.clone(),
                        version: 1,
                        created_at: now,
                        updated_at: now,
                    };
                    let commit = self.ledger.stage(&account, &drafts)?.with_hand(HandWrite::Open(hand));
                    self.commit(commit).await
                }
            })
            .await?;

        metrics::counter!("blackjack_hands_opened_total").increment(1);
        tracing::info!(hand_id = %hand_id, new_balance = %receipt.new_balance, "Blackjack hand opened");

        let view = BlackjackView::of(&round, None);
        Ok(hand_receipt(Some(hand_id), &view, stake, None, receipt.new_balance))
    }

    pub async fn blackjack_hit(&self, account_id: &str, hand_id: Uuid) -> Result<BlackjackHandReceipt> {
        self.blackjack_action(account_id, hand_id, HandAction::Hit).await
    }

    pub async fn blackjack_stand(&self, account_id: &str, hand_id: Uuid) -> Result<BlackjackHandReceipt> {
        self.blackjack_action(account_id, hand_id, HandAction::Stand).await
    }

    pub async fn blackjack_action(
        &self,
        account_id: &str,
        hand_id: Uuid,
        action: HandAction,
    ) -> Result<BlackjackHandReceipt> {
        let span = tracing::info_span!("blackjack_action", account_id = %account_id, hand_id = %hand_id, action = action.as_str());
        self.observe("blackjack", async {
            if matches!(action, HandAction::Double | HandAction::Split) {
                return Err(AppError::InvalidHandAction {
                    hand_id,
                    action: action.to_string(),
                    reason: "only hit and stand are offered".to_string(),
                });
            }
            self.with_retry(account_id, |_| self.apply_action(account_id, hand_id, action))
                .await
        })
        .instrument(span)
        .await
    }

    /// One attempt: reload hand and account, play the action, write the result
    async fn apply_action(&self, account_id: &str, hand_id: Uuid, action: HandAction) -> Result<BlackjackHandReceipt> {
        let mut hand = self
            .store
            .find_hand(hand_id)
            .await?
            .filter(|hand| hand.account_id == account_id)
            .ok_or(AppError::HandNotFound(hand_id))?;
        if !hand.is_open() {
            return Err(AppError::InvalidHandAction {
                hand_id,
                action: action.to_string(),
                reason: "hand is already settled".to_string(),
            });
        }

        let game = self
            .catalog
            .find_game(hand.game_id)
            .await?
            .ok_or(AppError::UnknownGame(hand.game_id))?;
        let rules = blackjack_rules(&game)?;

        let played = match action {
            HandAction::Hit => blackjack::hit(&mut hand.round, rules),
            _ if hand.stage() == RoundStage::DealerPlay => blackjack::play_dealer(&mut hand.round, rules),
            _ => blackjack::stand(&mut hand.round, rules),
        };
        played.map_err(|error| match error {
            AppError::InvalidInput(reason) => AppError::InvalidHandAction {
                hand_id,
                action: action.to_string(),
                reason,
            },
            other => other,
        })?;

        let expected_version = hand.version;
        hand.version += 1;
        hand.updated_at = Utc::now();

        if hand.is_open() {
            self.store.save_hand(&hand, expected_version).await?;
            let account = self.ledger.load(account_id).await?;
            let view = BlackjackView::of(&hand.round, None);
            tracing::info!(player_total = view.player_value.total, "Blackjack hand continues");
            return Ok(hand_receipt(Some(hand_id), &view, hand.stake, None, account.balance));
        }

        let outcome = outcome::blackjack_outcome(&hand.round, rules)?;
        let payout = outcome.payout(hand.stake)?;
        let OutcomePayload::Blackjack(view) = &outcome.payload else {
            return Err(AppError::Internal(anyhow::anyhow!("blackjack hand produced a non-card outcome")));
        };

        let account = self.ledger.load(account_id).await?;
        let mut drafts = Vec::new();
        if payout.is_positive() {
            drafts.push(LedgerEntryDraft::win(game.id, payout, payout_description(&game, &outcome)));
        }
        let commit = self.ledger.stage(&account, &drafts)?;
        let result = game_result(account_id, &game, commit.commit_id, Some(hand_id), hand.stake, payout, &outcome)?;
        let stake = hand.stake;
        let commit = commit.with_result(result).with_hand(HandWrite::Update {
            hand,
            expected_version,
        });
        let receipt = self.commit(commit).await?;

        let result = receipt
            .result
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("hand commit {} carried no result", receipt.commit_id)))?;

        tracing::info!(
            result_id = %result.result_id,
            resolution = ?view.resolution,
            payout = %payout,
            new_balance = %receipt.new_balance,
            "Blackjack hand settled"
        );

        let settlement = settlement_of(&result, view);
        Ok(hand_receipt(Some(hand_id), view, stake, settlement, receipt.new_balance))
    }
}

impl SettlementCoordinator {
    /// Stand every open hand idle for at least `max_idle`.
    ///
    /// An abandoned hand holds a debited stake with no game result; standing
    /// it writes the result, any payout and the hand closure in one commit.
    /// Returns how many hands were settled.
    pub async fn settle_abandoned_hands(&self, max_idle: Duration) -> Result<usize> {
        let max_idle = chrono::Duration::from_std(max_idle)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hand idle limit out of range: {}", e)))?;
        let cutoff = Utc::now() - max_idle;

        let stale: Vec<BlackjackHand> = self
            .store
            .open_hands()
            .await?
            .into_iter()
            .filter(|hand| hand.updated_at <= cutoff)
            .collect();

        let mut settled = 0;
        for hand in stale {
            match self.blackjack_stand(&hand.account_id, hand.hand_id).await {
                Ok(receipt) => {
                    settled += 1;
                    metrics::counter!("blackjack_hands_expired_total").increment(1);
                    tracing::info!(
                        hand_id = %hand.hand_id,
                        account_id = %hand.account_id,
                        idle_since = %hand.updated_at,
                        new_balance = %receipt.new_balance,
                        "Abandoned blackjack hand stood"
                    );
                }
                // The player finished it first
                Err(AppError::InvalidHandAction { .. }) => {}
                Err(error) => {
                    tracing::warn!(hand_id = %hand.hand_id, error = %error, "Failed to settle abandoned hand");
                }
            }
        }
        Ok(settled)
    }

    pub fn spawn_hand_sweeper(
        self: Arc<Self>,
        max_idle: Duration,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Hand sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.settle_abandoned_hands(max_idle).await {
                            Ok(settled) => tracing::debug!(settled, "Abandoned hand sweep finished"),
                            Err(e) => tracing::warn!(error = %e, "Abandoned hand sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

fn payout_description(game: &GameDefinition, outcome: &Outcome) -> String {
    match outcome.classification {
        ResultClass::Push => format!("Blackjack push - {}", game.name),
        _ => format!("Blackjack win - {}", game.name),
    }
}
