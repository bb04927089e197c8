//! Outbound message text. Kept short enough for a single SMS segment where possible.

use chrono::NaiveDate;

use crate::model::TimeWindow;

pub fn reservation_created(room: &str, owner: &str, date: NaiveDate, window: &TimeWindow) -> String {
    format!("[Room booking] {owner} reserved {room} on {date} {window}.")
}

pub fn preempted(room: &str, date: NaiveDate, window: &TimeWindow) -> String {
    format!(
        "[Room booking] Your reservation for {room} on {date} {window} was cancelled due to a priority booking."
    )
}

pub fn priority_confirmed(room: &str, date: NaiveDate, window: &TimeWindow, preempted: usize) -> String {
    match preempted {
        0 => format!("[Room booking] Priority reservation confirmed: {room} on {date} {window}."),
        1 => format!(
            "[Room booking] Priority reservation confirmed: {room} on {date} {window}. 1 reservation was cancelled."
        ),
        n => format!(
            "[Room booking] Priority reservation confirmed: {room} on {date} {window}. {n} reservations were cancelled."
        ),
    }
}

pub fn cancelled(room: &str, date: NaiveDate, window: &TimeWindow) -> String {
    format!("[Room booking] Your reservation for {room} on {date} {window} was cancelled.")
}
