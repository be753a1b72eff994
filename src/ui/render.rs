use std::fmt::Write;

use crate::api::models::{Role, Worker};
use crate::lobby::{LobbySnapshot, LobbyState, Message, MessageKind};
use crate::lobby::transcript::DeliveryStatus;
use crate::ui::request_list::{ListScreenConfig, MapRegion, RequestCard};
use crate::ui::status::{interest_label, participant_badge};
use crate::utils::format_amount;

pub fn stars(rating: f32) -> String {
    (1..=5)
        .map(|i| if (i as f32) <= rating { '★' } else { '☆' })
        .collect()
}

pub fn request_list(config: &ListScreenConfig, cards: &[RequestCard], region: Option<MapRegion>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", config.title, cards.len());
    if let Some(region) = region {
        let _ = writeln!(
            out,
            "Map centred on {:.4}, {:.4} (span {:.2} x {:.2})",
            region.latitude, region.longitude, region.latitude_delta, region.longitude_delta
        );
    }
    if cards.is_empty() {
        let _ = writeln!(out, "  No service requests found");
        return out;
    }
    for card in cards {
        let _ = writeln!(
            out,
            "#{:<5} {:<12} {:>10}  [{}]  urgency: {}",
            card.id, card.category, card.budget, card.badge.label, card.urgency
        );
        let _ = writeln!(out, "       {}", card.description);
        let mut details = format!("       {} | {}", card.interest, card.location);
        if let Some(created) = &card.created {
            let _ = write!(details, " | {}", created);
        }
        let _ = writeln!(out, "{}", details);
        if card.join_enabled {
            let _ = writeln!(out, "       -> join with `sala7li join {}`", card.id);
        }
    }
    out
}

pub fn workers(list: &[Worker]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Workers ({})", list.len());
    for worker in list {
        let id = worker.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
        let verified = if worker.verified { " ✓" } else { "" };
        let _ = writeln!(
            out,
            "#{:<5} {}{} {} {:.1}  {}",
            id,
            worker.name,
            verified,
            stars(worker.rating),
            worker.rating,
            worker.genre.as_deref().unwrap_or("")
        );
    }
    out
}

fn message_line(message: &Message) -> String {
    let who = match message.sender {
        Role::Client => "client",
        Role::Worker => "worker",
    };
    let time = message.sent_at.format("%H:%M");
    let marker = match message.delivery {
        DeliveryStatus::Pending => " (sending)",
        DeliveryStatus::Failed => " (not sent)",
        DeliveryStatus::LocalOnly | DeliveryStatus::Delivered => "",
    };
    match message.kind {
        MessageKind::Bid { amount } => format!(
            "[{}] {:>6}: 💰 Bid Placed {} - {}{}",
            time,
            who,
            format_amount(amount),
            message.text,
            marker
        ),
        MessageKind::Text => format!("[{}] {:>6}: {}{}", time, who, message.text, marker),
    }
}

pub fn lobby(snapshot: &LobbySnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Negotiation Lobby, request #{}", snapshot.request_id);
    if let Some(request) = &snapshot.request {
        let _ = writeln!(
            out,
            "{}  budget {}  ({})",
            request.category,
            format_amount(request.budget),
            request.status
        );
        let _ = writeln!(out, "{}", request.description);
    }
    if let Some(state) = snapshot.state {
        let _ = writeln!(out, "Your status: {}", state);
    }
    if let Some(bid) = snapshot.current_bid {
        let _ = writeln!(out, "Your current bid: {}", format_amount(bid));
    }
    let _ = writeln!(out, "{}", interest_label(snapshot.participant_count()));
    if snapshot.role == Role::Client {
        for p in &snapshot.participants {
            let name = p
                .worker
                .as_ref()
                .map(|w| w.name.clone())
                .unwrap_or_else(|| format!("worker #{}", p.worker_id));
            let bid = if p.has_bid() { format_amount(p.bid) } else { "no bid yet".into() };
            let _ = writeln!(
                out,
                "  - {} [{}] {}",
                name,
                participant_badge(&p.status, false).label,
                bid
            );
        }
    }
    let _ = writeln!(out, "Discussion");
    if snapshot.transcript.is_empty() {
        let _ = writeln!(out, "  (no messages yet)");
    }
    for message in &snapshot.transcript {
        let _ = writeln!(out, "  {}", message_line(message));
    }
    if snapshot.state == Some(LobbyState::Left) {
        let _ = writeln!(out, "You have left this lobby.");
    }
    out
}
