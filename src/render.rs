//! HTML projection of a [`ChatView`].
//!
//! Every function here is pure: the same view always renders the same
//! fragment. Backend text is escaped; assistant reply bodies pass through
//! [`crate::markup::sanitize`].

use chrono::{DateTime, NaiveDateTime};

use crate::markup::{escape, sanitize};
use crate::protocol::{Appointment, ChatMessage, ClinicSearchResult};
use crate::view::{ChatView, ConnectionStatus};

/// Date-time layout matching the browser's default `en-US` locale string.
const LOCALE_DATETIME: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Render the whole transcript region.
#[must_use]
pub fn transcript(view: &ChatView) -> String {
    let mut html = String::from(r#"<div id="chat-transcript" class="flex flex-col gap-2">"#);

    if let Some(banner) = status_banner(view.status()) {
        html.push_str(&banner);
    }
    for message in view.messages() {
        html.push_str(&message_row(message));
    }
    if view.is_typing() {
        html.push_str(TYPING_ROW);
    }
    if view.followup_pending() {
        html.push_str(
            r#"<div class="chat-notice text-xs text-textMuted" role="status">Please provide the missing information.</div>"#,
        );
    }
    if view.delivery_failed() {
        html.push_str(
            r#"<div class="chat-notice text-xs text-danger" role="alert">Message could not be delivered.</div>"#,
        );
    }

    html.push_str("</div>");
    // Keeps the form's button in step with the typing indicator.
    html.push_str(&send_button(view.is_typing(), true));
    html
}

const TYPING_ROW: &str = r#"<div class="chat-typing flex justify-start items-center gap-2 mb-2"><span class="text-textMuted">AI is typing...</span><span class="spinner" aria-hidden="true"></span></div>"#;

fn status_banner(status: ConnectionStatus) -> Option<String> {
    let text = match status {
        ConnectionStatus::Open => return None,
        ConnectionStatus::Connecting => "Connecting…".to_string(),
        ConnectionStatus::Reconnecting { attempt } => {
            format!("Connection lost. Reconnecting (attempt {attempt})…")
        }
        ConnectionStatus::Disconnected => "Disconnected. Reload the page to try again.".to_string(),
    };
    Some(format!(
        r#"<div class="chat-status text-xs text-center text-textMuted" role="status">{text}</div>"#
    ))
}

/// Render one transcript row.
#[must_use]
pub fn message_row(message: &ChatMessage) -> String {
    let patient = message.is_patient();
    let (justify, bubble, author) = if patient {
        ("justify-end", "bg-primaryContainer text-textPrimary text-right", "You")
    } else if matches!(message, ChatMessage::Error { .. }) {
        ("justify-start", "bg-dangerContainer text-danger text-left", "AI")
    } else {
        ("justify-start", "bg-surfaceVariant text-primary text-left", "AI")
    };

    let body = match message {
        ChatMessage::AiResponse(resp) => {
            let mut body = format!(
                r#"<div class="chat-body">{}</div>"#,
                sanitize(resp.message.text())
            );
            let clinics = resp.clinics();
            if !clinics.is_empty() {
                body.push_str("<div><strong>Available Clinics:</strong>");
                for clinic in clinics {
                    body.push_str(&clinic_card(clinic));
                }
                body.push_str("</div>");
            }
            body
        }
        other => escape(other.text()),
    };

    format!(
        r#"<div class="chat-row flex {justify} mb-2" data-type="{kind}"><div class="max-w-[70%] rounded-md p-3 text-sm shadow-md {bubble}"><strong>{author}:</strong> {body}</div></div>"#,
        kind = message.kind(),
    )
}

/// Render one clinic search result as a card.
#[must_use]
pub fn clinic_card(result: &ClinicSearchResult) -> String {
    let clinic = &result.clinic;
    let appointments: String = result.appointments.iter().map(appointment_item).collect();

    format!(
        r#"<div class="clinic-card border rounded-md p-3 mb-2 bg-surfaceContainer"><p class="font-bold">{name}</p><p>{address}</p><p>{city}, {state} {zip}</p><p>Distance: {distance}</p><p>Vaccines Offered: {vaccines}</p><p class="font-bold">Available Appointments:</p><ul class="appointments">{appointments}</ul></div>"#,
        name = escape(&clinic.name),
        address = escape(&clinic.address),
        city = escape(&clinic.city),
        state = escape(&clinic.state),
        zip = escape(&clinic.zip_code),
        distance = format_distance(result.distance),
        vaccines = escape(&clinic.vaccines.join(", ")),
    )
}

fn appointment_item(appointment: &Appointment) -> String {
    format!(
        "<li>- {} (Status: {})</li>",
        escape(&format_timestamp(&appointment.appointment_time)),
        escape(&appointment.status)
    )
}

/// Distance with two decimals, in meters.
#[must_use]
pub fn format_distance(distance: f64) -> String {
    format!("{distance:.2} meters")
}

/// Human-readable date-time; unparseable input is returned unchanged.
#[must_use]
pub fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(LOCALE_DATETIME).to_string();
    }
    match raw.parse::<NaiveDateTime>() {
        Ok(dt) => dt.format(LOCALE_DATETIME).to_string(),
        Err(_) => raw.to_string(),
    }
}

/// The message input form, empty.
#[must_use]
pub fn input_form() -> String {
    format!(
        r#"<form id="chat-input" class="flex gap-2 md:gap-3" hx-post="/chat/send" hx-swap="outerHTML" hx-trigger="submit">
    <input
        name="message"
        type="text"
        placeholder="Type your message..."
        autocomplete="off"
        class="flex-1 h-12 px-4 rounded-xl bg-surface text-textPrimary placeholder:text-textMuted focus:outline-none focus:ring-2 focus:ring-primary"
        autofocus
    >
    {button}
</form>"#,
        button = send_button(false, false)
    )
}

/// Send button; disabled with a "Sending..." label while the assistant is typing.
///
/// With `out_of_band` set the button carries `hx-swap-oob` so a transcript
/// update can replace the one inside the form.
#[must_use]
pub fn send_button(sending: bool, out_of_band: bool) -> String {
    let oob = if out_of_band { r#" hx-swap-oob="true""# } else { "" };
    let (state, label) = if sending {
        (r#" disabled aria-busy="true""#, "Sending...")
    } else {
        ("", "Send")
    };
    format!(
        r#"<button id="chat-send" type="submit"{oob}{state} class="shrink-0 h-12 px-5 rounded-xl bg-primary text-white hover:bg-primaryMuted active:scale-95 transition-all shadow-md disabled:opacity-60">{label}</button>"#
    )
}
