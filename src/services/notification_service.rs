//! Notification heuristics and the background scanner.
//!
//! [`due_notifications`] is pure: given the clock and the open records it
//! returns every notification that should exist right now. Each candidate
//! carries a composite dedup key, so running the scan again (or after a
//! restart) never produces a second copy.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::task::JoinHandle;

use crate::{
    db::{InvoiceStore, NotificationStore, QuotationStore},
    error::Result,
    models::{
        invoice::{Invoice, InvoiceStatus},
        notification::{NewNotification, Notification, NotificationKind, Recipient},
        quotation::{Quotation, QuotationFilter, QuotationStatus},
        user::Role,
    },
    pricing::format_money,
    ws::SharedConnectionManager,
};

/// Every scheduled notification that is due at `now`.
///
/// `pending` are quotations awaiting a decision, `decided_last_week` those won
/// or lost during the previous ISO week, `unpaid` the invoices not yet paid.
pub fn due_notifications(
    now: DateTime<Utc>,
    pending: &[Quotation],
    decided_last_week: &[Quotation],
    unpaid: &[Invoice],
) -> Vec<NewNotification> {
    let today = now.date_naive();
    let mut due = Vec::new();

    for quotation in pending {
        if quotation.status != QuotationStatus::Pending {
            continue;
        }
        if let Some(follow_up) = quotation.follow_up_date.filter(|date| *date <= today) {
            due.push(NewNotification {
                dedup_key: format!("follow-up:{}:{}", quotation.id, follow_up),
                kind: NotificationKind::FollowUpDue,
                title: "Follow-up due".to_string(),
                message: format!(
                    "Quotation {} for {} ({} to {}) was due for follow-up on {}",
                    quotation.reference,
                    quotation.client_name,
                    quotation.origin,
                    quotation.destination,
                    follow_up
                ),
                recipient: Recipient::User(quotation.quote_sent_by),
                entity: Some(("quotation", quotation.id)),
            });
        }
    }

    for invoice in unpaid {
        if invoice.status == InvoiceStatus::Paid || invoice.due_date >= today {
            continue;
        }
        due.push(NewNotification {
            dedup_key: format!("invoice-overdue:{}", invoice.id),
            kind: NotificationKind::InvoiceOverdue,
            title: "Invoice overdue".to_string(),
            message: format!(
                "Invoice {} for {} ({} {}) was due on {}",
                invoice.invoice_number,
                invoice.client_name,
                format_money(invoice.total),
                invoice.currency,
                invoice.due_date
            ),
            recipient: Recipient::Role(Role::FinanceOfficer),
            entity: Some(("invoice", invoice.id)),
        });
    }

    let awaiting = pending
        .iter()
        .filter(|q| q.status == QuotationStatus::Pending)
        .count();
    if awaiting > 0 {
        due.push(NewNotification {
            dedup_key: format!("daily-pending:{}", today),
            kind: NotificationKind::DailyPendingDigest,
            title: "Quotations awaiting approval".to_string(),
            message: format!("{} quotation(s) are waiting for a decision", awaiting),
            recipient: Recipient::Role(Role::Admin),
            entity: None,
        });
    }

    let week = last_week(today).iso_week();
    let won = decided_last_week
        .iter()
        .filter(|q| q.status == QuotationStatus::Won)
        .count();
    let lost = decided_last_week
        .iter()
        .filter(|q| q.status == QuotationStatus::Lost)
        .count();
    due.push(NewNotification {
        dedup_key: format!("weekly-summary:{}-W{:02}", week.year(), week.week()),
        kind: NotificationKind::WeeklySummary,
        title: "Weekly quotation summary".to_string(),
        message: format!(
            "Last week: {} won, {} lost, {} still pending",
            won, lost, awaiting
        ),
        recipient: Recipient::Role(Role::SalesDirector),
        entity: None,
    });

    due
}

/// Admins are told about every new quotation
pub fn quotation_submitted(quotation: &Quotation) -> NewNotification {
    NewNotification {
        dedup_key: format!("quotation-submitted:{}", quotation.id),
        kind: NotificationKind::QuotationSubmitted,
        title: "New quotation".to_string(),
        message: format!(
            "{} submitted {} for {} ({} {})",
            quotation.quote_sent_by_name,
            quotation.reference,
            quotation.client_name,
            format_money(quotation.client_quote),
            quotation.currency
        ),
        recipient: Recipient::Role(Role::Admin),
        entity: Some(("quotation", quotation.id)),
    }
}

/// The quoting user learns the outcome of their quotation
pub fn quotation_decided(quotation: &Quotation) -> NewNotification {
    let outcome = match quotation.status {
        QuotationStatus::Won => "approved".to_string(),
        QuotationStatus::Lost => match &quotation.rejection_reason {
            Some(reason) => format!("rejected: {}", reason),
            None => "rejected".to_string(),
        },
        QuotationStatus::Pending => "reopened".to_string(),
    };

    NewNotification {
        dedup_key: format!("quotation-decided:{}", quotation.id),
        kind: NotificationKind::QuotationDecided,
        title: format!("Quotation {}", quotation.reference),
        message: format!("{} for {} was {}", quotation.reference, quotation.client_name, outcome),
        recipient: Recipient::User(quotation.quote_sent_by),
        entity: Some(("quotation", quotation.id)),
    }
}

fn start_of_week(today: NaiveDate) -> NaiveDate {
    today - chrono::Duration::days(i64::from(today.weekday().num_days_from_monday()))
}

/// Monday of the week before `today`'s
fn last_week(today: NaiveDate) -> NaiveDate {
    start_of_week(today) - chrono::Duration::days(7)
}

/// Stores notifications and pushes the new ones to connected dashboards
#[derive(Clone)]
pub struct NotificationService {
    notifications: NotificationStore,
    quotations: QuotationStore,
    invoices: InvoiceStore,
    connections: SharedConnectionManager,
}

impl NotificationService {
    pub fn new(
        notifications: NotificationStore,
        quotations: QuotationStore,
        invoices: InvoiceStore,
        connections: SharedConnectionManager,
    ) -> Self {
        Self {
            notifications,
            quotations,
            invoices,
            connections,
        }
    }

    /// Returns the stored notification, or `None` if its key was already used
    pub async fn notify(&self, new: &NewNotification) -> Result<Option<Notification>> {
        let stored = self.notifications.insert(new).await?;

        if let Some(notification) = &stored {
            tracing::debug!("Notification {} stored", notification.dedup_key);
            if let Err(e) = self.connections.push_notification(notification).await {
                tracing::warn!("Failed to push notification {}: {}", notification.id, e);
            }
        }
        Ok(stored)
    }

    /// Event notifications must not fail the request that triggered them
    pub async fn notify_quietly(&self, new: NewNotification) {
        if let Err(e) = self.notify(&new).await {
            tracing::error!("Failed to store notification {}: {}", new.dedup_key, e);
        }
    }

    /// Run the heuristics once; returns how many notifications were new
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<usize> {
        let pending = self
            .quotations
            .list(
                &QuotationFilter {
                    status: Some(QuotationStatus::Pending),
                    ..Default::default()
                },
                None,
            )
            .await?;
        let today = now.date_naive();
        let decided = self
            .quotations
            .list_decided_between(last_week(today), start_of_week(today))
            .await?;
        let unpaid = self.invoices.list_unpaid().await?;

        let mut created = 0;
        for candidate in due_notifications(now, &pending, &decided, &unpaid) {
            if self.notify(&candidate).await?.is_some() {
                created += 1;
            }
        }

        if created > 0 {
            tracing::info!("Notification scan created {} notification(s)", created);
        }
        Ok(created)
    }

    /// Scan on a fixed interval until the process exits
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = self.scan(Utc::now()).await {
                    tracing::error!("Notification scan failed: {}", e);
                }
            }
        })
    }
}
