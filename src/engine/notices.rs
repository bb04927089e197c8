//! Post-commit announcements. Nothing here can undo a committed change; every
//! failure is folded into the `(notified, audit_recorded)` pair.

use futures::future::join_all;
use tracing::warn;

use crate::messages;
use crate::model::*;
use crate::notify::{DeliveryOutcome, Dispatch, FanoutReport};

use super::Engine;

impl Engine {
    /// Roster-wide announcement plus one audit record for the owner carrying
    /// the aggregate outcome.
    pub(super) async fn announce_created(&self, details: &ReservationDetails) -> (bool, bool) {
        let r = &details.reservation;
        let message =
            messages::reservation_created(&details.room_name, &details.owner_name, r.date, &r.window);

        let report = match self.users.roster().await {
            Ok(roster) => {
                let dispatches = roster
                    .into_iter()
                    .map(|c| Dispatch::new(c.address, message.clone()))
                    .collect();
                self.fanout.notify_many(dispatches).await
            }
            Err(e) => {
                warn!(reservation_id = r.id, "roster lookup failed: {e}");
                FanoutReport::default()
            }
        };

        let notified = report.any_delivered();
        if !notified {
            warn!(
                reservation_id = r.id,
                failed = report.failed_count(),
                "booking announcement reached nobody"
            );
        }
        let status = if notified {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Failed
        };
        let audit_recorded = self
            .audit
            .record(r.user_id, Some(r.id), &message, status)
            .await
            .is_ok();
        (notified, audit_recorded)
    }

    /// One notice per preempted owner, sent concurrently, then a confirmation
    /// to the admin. Each message gets its own audit record.
    pub(super) async fn announce_priority(
        &self,
        admin: &Principal,
        details: &ReservationDetails,
        preempted: &[Reservation],
    ) -> (bool, bool) {
        let r = &details.reservation;
        let room = details.room_name.as_str();

        let notices: Vec<String> = preempted
            .iter()
            .map(|p| messages::preempted(room, p.date, &p.window))
            .collect();
        let addresses = join_all(preempted.iter().map(|p| self.contact_address(p.user_id))).await;

        let mut outcomes = vec![DeliveryOutcome::failed("no contact address"); preempted.len()];
        let mut slots = Vec::new();
        let mut dispatches = Vec::new();
        for (idx, address) in addresses.into_iter().enumerate() {
            if let Some(address) = address {
                slots.push(idx);
                dispatches.push(Dispatch::new(address, notices[idx].clone()));
            }
        }
        let report = self.fanout.notify_many(dispatches).await;
        for (idx, outcome) in slots.into_iter().zip(report.outcomes) {
            outcomes[idx] = outcome;
        }
        for (p, outcome) in preempted.iter().zip(&outcomes) {
            if let DeliveryOutcome::Failed { reason } = outcome {
                warn!(reservation_id = p.id, user_id = p.user_id, "preemption notice failed: {reason}");
            }
        }

        let audits = join_all(preempted.iter().zip(&notices).zip(&outcomes).map(
            |((p, message), outcome)| self.audit.record(p.user_id, Some(p.id), message, outcome.status()),
        ))
        .await;
        let mut audit_recorded = audits.iter().all(Result::is_ok);

        let confirmation = messages::priority_confirmed(room, r.date, &r.window, preempted.len());
        let outcome = self
            .fanout
            .notify_one(Dispatch::new(admin.phone.clone(), confirmation.clone()))
            .await;
        if let DeliveryOutcome::Failed { reason } = &outcome {
            warn!(reservation_id = r.id, user_id = admin.id, "priority confirmation failed: {reason}");
        }
        audit_recorded &= self
            .audit
            .record(admin.id, Some(r.id), &confirmation, outcome.status())
            .await
            .is_ok();

        (outcome.is_delivered(), audit_recorded)
    }

    /// Tell the owner their reservation is gone. A requester cancelling their
    /// own booking is reached at the phone number they are signed in with.
    pub(super) async fn announce_cancelled(
        &self,
        requester: &Principal,
        reservation: &Reservation,
    ) -> (bool, bool) {
        let room = self.room_name(reservation.room_id).await;
        let message = messages::cancelled(&room, reservation.date, &reservation.window);

        let address = if reservation.user_id == requester.id {
            Some(requester.phone.clone())
        } else {
            self.contact_address(reservation.user_id).await
        };
        let outcome = match address {
            Some(address) => self.fanout.notify_one(Dispatch::new(address, message.clone())).await,
            None => DeliveryOutcome::failed("no contact address"),
        };
        if let DeliveryOutcome::Failed { reason } = &outcome {
            warn!(reservation_id = reservation.id, "cancellation notice failed: {reason}");
        }

        let audit_recorded = self
            .audit
            .record(reservation.user_id, Some(reservation.id), &message, outcome.status())
            .await
            .is_ok();
        (outcome.is_delivered(), audit_recorded)
    }

    async fn contact_address(&self, user_id: UserId) -> Option<String> {
        match self.users.contact(user_id).await {
            Ok(Some(contact)) => Some(contact.address),
            Ok(None) => {
                warn!(user_id, "no contact on file");
                None
            }
            Err(e) => {
                warn!(user_id, "contact lookup failed: {e}");
                None
            }
        }
    }
}
