use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use poapbot_core::domain::delivery::NewDeliveryRecord;
use poapbot_core::domain::reaction::ReactionEvent;
use poapbot_core::domain::rule::Rule;
use poapbot_db::repositories::{DeliveryLog, ReactionLedger, RuleRepository};
use poapbot_notify::{dm, EmailNotifier};
use poapbot_poap::ClaimLinkIssuer;
use poapbot_slack::gateway::ChatGateway;

/// Terminal state of one evaluation. Returned for observability; every
/// variant is a normal outcome, none is an error the caller must handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// The message author could not be determined (deleted message,
    /// lookup race) or a collaborator failed before any state changed.
    Aborted,
    /// No active rule covers the message's channel. The ledger is left
    /// untouched for unruled channels.
    NoRule,
    /// Count recorded; threshold not yet met.
    BelowThreshold,
    /// The snapshot was already marked delivered; replay suppressed.
    AlreadyDelivered,
    /// Threshold met but the author has no email on their profile; they
    /// were prompted to add one.
    EmailMissing,
    /// The claim email could not be sent; the snapshot stays
    /// undelivered so a later reaction retries.
    EmailFailed,
    Delivered,
}

type LockKey = (String, String);

/// Orchestrates rule resolution, count refresh, dedup and delivery for
/// one reaction notification at a time per (message, author) pair.
pub struct DeliveryEvaluator {
    rules: Arc<dyn RuleRepository>,
    ledger: Arc<dyn ReactionLedger>,
    deliveries: Arc<dyn DeliveryLog>,
    chat: Arc<dyn ChatGateway>,
    issuer: Arc<dyn ClaimLinkIssuer>,
    email: Arc<dyn EmailNotifier>,
    // Serializes the read-check-write section per (message, author) so
    // a burst of reactions on one message cannot double-deliver within
    // this process.
    in_flight: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl DeliveryEvaluator {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        ledger: Arc<dyn ReactionLedger>,
        deliveries: Arc<dyn DeliveryLog>,
        chat: Arc<dyn ChatGateway>,
        issuer: Arc<dyn ClaimLinkIssuer>,
        email: Arc<dyn EmailNotifier>,
    ) -> Self {
        Self {
            rules,
            ledger,
            deliveries,
            chat,
            issuer,
            email,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the full pipeline for one `reaction_added` notification.
    /// Never fails: every collaborator error ends the evaluation with a
    /// log line and an `Aborted` outcome.
    pub async fn evaluate(&self, event: ReactionEvent) -> Evaluation {
        let author = match self.chat.message_author(&event.channel_id, &event.message_ts).await {
            Ok(Some(author)) => author,
            Ok(None) => {
                debug!(
                    event_name = "engine.evaluate.no_author",
                    channel_id = %event.channel_id,
                    message_ts = %event.message_ts,
                    "message has no attributable author; skipping"
                );
                return Evaluation::Aborted;
            }
            Err(lookup_error) => {
                warn!(
                    event_name = "engine.evaluate.author_lookup_failed",
                    channel_id = %event.channel_id,
                    message_ts = %event.message_ts,
                    error = %lookup_error,
                    "could not resolve message author"
                );
                return Evaluation::Aborted;
            }
        };

        // Rules are keyed by channel *name*, so translate the id first.
        let channel_name = match self.chat.channel_name(&event.channel_id).await {
            Ok(name) => name,
            Err(lookup_error) => {
                warn!(
                    event_name = "engine.evaluate.channel_lookup_failed",
                    channel_id = %event.channel_id,
                    error = %lookup_error,
                    "could not resolve channel name"
                );
                return Evaluation::Aborted;
            }
        };

        let rule = match self.rules.find_active_by_channel(&channel_name).await {
            Ok(Some(rule)) => rule,
            Ok(None) => {
                debug!(
                    event_name = "engine.evaluate.no_rule",
                    channel = %channel_name,
                    "no active rule for channel"
                );
                return Evaluation::NoRule;
            }
            Err(repo_error) => {
                error!(
                    event_name = "engine.evaluate.rule_lookup_failed",
                    channel = %channel_name,
                    error = %repo_error,
                    "rule lookup failed"
                );
                return Evaluation::Aborted;
            }
        };

        let key = (event.message_ts.clone(), author.clone());
        let slot = self.lock_slot(&key).await;
        let _guard = slot.lock().await;
        let outcome = self.evaluate_locked(&event, &author, &channel_name, &rule).await;
        drop(_guard);
        self.release_slot(&key, slot).await;

        outcome
    }

    async fn evaluate_locked(
        &self,
        event: &ReactionEvent,
        author: &str,
        channel_name: &str,
        rule: &Rule,
    ) -> Evaluation {
        // The notification's per-emoji count is never trusted; re-fetch
        // the live aggregate across all emoji types.
        let total_reactions =
            match self.chat.total_reactions(&event.channel_id, &event.message_ts).await {
                Ok(total) => total,
                Err(lookup_error) => {
                    warn!(
                        event_name = "engine.evaluate.count_fetch_failed",
                        channel_id = %event.channel_id,
                        message_ts = %event.message_ts,
                        error = %lookup_error,
                        "could not fetch live reaction count"
                    );
                    return Evaluation::Aborted;
                }
            };

        if let Err(repo_error) = self
            .ledger
            .upsert(&event.message_ts, &event.channel_id, author, total_reactions)
            .await
        {
            error!(
                event_name = "engine.evaluate.ledger_upsert_failed",
                message_ts = %event.message_ts,
                user_id = author,
                error = %repo_error,
                "could not record reaction count"
            );
            return Evaluation::Aborted;
        }

        if total_reactions < rule.reaction_threshold {
            debug!(
                event_name = "engine.evaluate.below_threshold",
                message_ts = %event.message_ts,
                total_reactions,
                threshold = rule.reaction_threshold,
                "threshold not met"
            );
            return Evaluation::BelowThreshold;
        }

        match self.ledger.find(&event.message_ts, author).await {
            Ok(Some(snapshot)) if snapshot.delivered => {
                debug!(
                    event_name = "engine.evaluate.already_delivered",
                    message_ts = %event.message_ts,
                    user_id = author,
                    "POAP already delivered for this message"
                );
                return Evaluation::AlreadyDelivered;
            }
            Ok(_) => {}
            Err(repo_error) => {
                error!(
                    event_name = "engine.evaluate.ledger_read_failed",
                    message_ts = %event.message_ts,
                    user_id = author,
                    error = %repo_error,
                    "could not read delivery state"
                );
                return Evaluation::Aborted;
            }
        }

        let profile = match self.chat.user_profile(author).await {
            Ok(profile) => profile,
            Err(lookup_error) => {
                warn!(
                    event_name = "engine.evaluate.profile_lookup_failed",
                    user_id = author,
                    error = %lookup_error,
                    "could not load author profile"
                );
                return Evaluation::Aborted;
            }
        };

        let Some(recipient_email) = profile.email else {
            info!(
                event_name = "engine.evaluate.email_missing",
                user_id = author,
                "author has no email on profile; prompting"
            );
            if let Err(dm_error) =
                self.chat.post_dm(author, &dm::email_missing_prompt(total_reactions)).await
            {
                warn!(
                    event_name = "engine.evaluate.prompt_dm_failed",
                    user_id = author,
                    error = %dm_error,
                    "could not send email prompt DM"
                );
            }
            return Evaluation::EmailMissing;
        };

        let claim_link = self.issuer.issue(&rule.event_id, &recipient_email).await;

        let sent = self
            .email
            .send_claim_email(
                &recipient_email,
                &profile.display_name,
                &rule.poap_name,
                Some(&claim_link),
            )
            .await;
        if !sent.success {
            error!(
                event_name = "engine.evaluate.email_failed",
                user_id = author,
                error = sent.error.as_deref().unwrap_or("unknown"),
                "claim email failed; delivery will retry on the next reaction"
            );
            return Evaluation::EmailFailed;
        }

        if let Err(repo_error) = self.ledger.mark_delivered(&event.message_ts, author).await {
            // The email is already out; losing the flag risks a
            // duplicate on replay, which at-least-once tolerates.
            error!(
                event_name = "engine.evaluate.mark_delivered_failed",
                message_ts = %event.message_ts,
                user_id = author,
                error = %repo_error,
                "could not mark snapshot delivered"
            );
        }

        if let Err(repo_error) = self
            .deliveries
            .append(NewDeliveryRecord {
                user_id: author.to_owned(),
                user_email: recipient_email.clone(),
                message_id: event.message_ts.clone(),
                channel_id: event.channel_id.clone(),
                event_id: rule.event_id.clone(),
                claim_link: Some(claim_link),
            })
            .await
        {
            error!(
                event_name = "engine.evaluate.audit_append_failed",
                message_ts = %event.message_ts,
                user_id = author,
                error = %repo_error,
                "could not append delivery record"
            );
        }

        if let Err(dm_error) = self
            .chat
            .post_dm(
                author,
                &dm::delivery_congratulations(
                    &profile.display_name,
                    channel_name,
                    total_reactions,
                    &recipient_email,
                ),
            )
            .await
        {
            warn!(
                event_name = "engine.evaluate.congrats_dm_failed",
                user_id = author,
                error = %dm_error,
                "could not send congratulations DM"
            );
        }

        info!(
            event_name = "engine.evaluate.delivered",
            message_ts = %event.message_ts,
            user_id = author,
            channel = channel_name,
            poap_event_id = %rule.event_id.0,
            total_reactions,
            "POAP delivered"
        );
        Evaluation::Delivered
    }

    async fn lock_slot(&self, key: &LockKey) -> Arc<Mutex<()>> {
        let mut slots = self.in_flight.lock().await;
        slots.entry(key.clone()).or_default().clone()
    }

    async fn release_slot(&self, key: &LockKey, slot: Arc<Mutex<()>>) {
        let mut slots = self.in_flight.lock().await;
        drop(slot);
        // Drop the map entry once no other evaluation holds it.
        if slots.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            slots.remove(key);
        }
    }
}
