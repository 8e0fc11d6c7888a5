/// Groups prioritized leads by team and delivers one payload per recipient.
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{TeamId, TeamPayload};
use crate::notifier::Notifier;
use crate::retry::{with_retry_counted, RetryPolicy};
use crate::scoring::PrioritizedLead;

/// Team → notification recipients.
pub type TeamRecipients = BTreeMap<TeamId, Vec<String>>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeliveryOutcome {
    pub team: TeamId,
    /// Empty when the team had no recipient configured.
    pub recipient: String,
    pub delivered: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// One payload per team, in team order. A lead routed to N teams lands in
/// N payloads; lead order inside a payload follows the input order.
pub fn group_by_team(leads: &[PrioritizedLead]) -> Vec<TeamPayload> {
    let mut groups: BTreeMap<TeamId, Vec<PrioritizedLead>> = BTreeMap::new();
    for scored in leads {
        for team in &scored.lead().teams {
            groups.entry(*team).or_default().push(scored.clone());
        }
    }

    groups
        .into_iter()
        .map(|(team, leads)| TeamPayload {
            team,
            total_value: leads.iter().map(|l| l.lead().value).sum(),
            total_steel: leads
                .iter()
                .map(|l| u64::from(l.lead().steel_requirements.total()))
                .sum(),
            leads,
        })
        .collect()
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    recipients: TeamRecipients,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, recipients: TeamRecipients, retry: RetryPolicy) -> Self {
        Self {
            notifier,
            recipients,
            retry,
        }
    }

    /// Delivers every team payload to each of its recipients. A failing
    /// recipient never blocks the others.
    pub async fn dispatch(&self, leads: &[PrioritizedLead]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for payload in group_by_team(leads) {
            let recipients = self
                .recipients
                .get(&payload.team)
                .filter(|r| !r.is_empty());

            let Some(recipients) = recipients else {
                tracing::warn!(
                    "⚠ No recipients for {}; {} lead(s) not delivered",
                    payload.team,
                    payload.leads.len()
                );
                report.outcomes.push(DeliveryOutcome {
                    team: payload.team,
                    recipient: String::new(),
                    delivered: false,
                    attempts: 0,
                    error: Some("no recipients configured".to_string()),
                });
                continue;
            };

            for recipient in recipients {
                let label = format!("notify:{}:{}", payload.team, recipient);
                let attempted = with_retry_counted(&self.retry, &label, || {
                    self.notifier.deliver(recipient, &payload)
                })
                .await;

                let error = match &attempted.result {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!(
                            "❌ Delivery of {} to {} failed via {}: {}",
                            payload.team,
                            recipient,
                            self.notifier.channel(),
                            e
                        );
                        Some(e.to_string())
                    }
                };
                report.outcomes.push(DeliveryOutcome {
                    team: payload.team,
                    recipient: recipient.clone(),
                    delivered: error.is_none(),
                    attempts: attempted.attempts,
                    error,
                });
            }
        }

        tracing::info!(
            "Dispatch finished: {} delivered, {} failed",
            report.delivered(),
            report.failed()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::models::{Lead, LeadSource};
    use crate::scoring::{PriorityScorer, PriorityWeights};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Duration;

    fn scored(title: &str, teams: &[TeamId], value: f64) -> PrioritizedLead {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut lead = Lead::from_text(title, "https://news.example.in/x", LeadSource::Scrape, now);
        lead.teams = teams.iter().copied().collect::<BTreeSet<_>>();
        lead.value = value;
        PriorityScorer::new(PriorityWeights::default(), now).prioritize_one(lead)
    }

    /// Records deliveries; fails for recipients listed in `broken`.
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, TeamId)>>,
        broken: Vec<String>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn channel(&self) -> &str {
            "test"
        }

        async fn deliver(&self, recipient: &str, payload: &TeamPayload) -> Result<(), AppError> {
            if self.broken.iter().any(|b| b == recipient) {
                return Err(AppError::ExternalApiError("mailbox unavailable".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), payload.team));
            Ok(())
        }
    }

    #[test]
    fn test_lead_lands_in_every_team() {
        let leads = vec![
            scored("Metro viaduct", &[TeamId::TmtBars, TeamId::HrCrPlates], 400.0),
            scored("Rooftop solar", &[TeamId::Solar], 50.0),
        ];
        let payloads = group_by_team(&leads);
        let teams: Vec<TeamId> = payloads.iter().map(|p| p.team).collect();
        assert_eq!(teams, vec![TeamId::TmtBars, TeamId::HrCrPlates, TeamId::Solar]);
        assert_eq!(payloads[0].total_value, 400.0);
        assert_eq!(payloads[2].leads.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_recipient_does_not_block_others() {
        let notifier = Arc::new(RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            broken: vec!["down@example.in".to_string()],
        });
        let recipients = TeamRecipients::from([(
            TeamId::TmtBars,
            vec!["down@example.in".to_string(), "ok@example.in".to_string()],
        )]);
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            call_timeout: Duration::from_millis(200),
            inter_call_delay: Duration::ZERO,
        };
        let dispatcher = Dispatcher::new(notifier.clone(), recipients, retry);

        let report = dispatcher
            .dispatch(&[scored("Bridge", &[TeamId::TmtBars, TeamId::Solar], 100.0)])
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.outcomes[0].delivered);
        assert_eq!(report.outcomes[0].attempts, 3);
        assert!(report.outcomes[1].delivered);
        assert_eq!(report.outcomes[1].attempts, 1);
        assert_eq!(report.outcomes[2].team, TeamId::Solar);
        assert!(!report.outcomes[2].delivered);
        assert_eq!(
            notifier.sent.lock().unwrap().as_slice(),
            &[("ok@example.in".to_string(), TeamId::TmtBars)]
        );
    }
}
