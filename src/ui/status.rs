use crate::api::models::{Category, ParticipantStatus, RequestStatus, Urgency};

/// Colors are the hex values the mobile screens used, kept so other front
/// ends can render the same badges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub label: String,
    pub background: &'static str,
    pub text_color: &'static str,
    pub marker: &'static str,
}

const GREY_BG: &str = "#F3F4F6";
const GREY_TEXT: &str = "#6B7280";
const GREY_MARKER: &str = "#8E8E93";

/// Badge for a participation row. A job both sides marked complete is shown
/// as completed whatever its bidding status says.
pub fn participant_badge(status: &ParticipantStatus, completed: bool) -> Badge {
    if completed {
        return Badge {
            label: "Completed".into(),
            background: "#D1FAE5",
            text_color: "#065F46",
            marker: "#34C759",
        };
    }
    match status {
        ParticipantStatus::Pending => Badge {
            label: "Pending".into(),
            background: "#FEF3C7",
            text_color: "#92400E",
            marker: "#FF9500",
        },
        ParticipantStatus::Bidding => Badge {
            label: "Bidding".into(),
            background: "#DBEAFE",
            text_color: "#1E40AF",
            marker: "#007AFF",
        },
        ParticipantStatus::Accepted => Badge {
            label: "Accepted".into(),
            background: "#E9D5FF",
            text_color: "#7C3AED",
            marker: "#AF52DE",
        },
        ParticipantStatus::Other(raw) => fallback_badge(raw),
    }
}

pub fn request_badge(status: &RequestStatus) -> Badge {
    match status {
        RequestStatus::Open => Badge {
            label: "Open".into(),
            background: "#D1FAE5",
            text_color: "#065F46",
            marker: "#34C759",
        },
        RequestStatus::InProgress => Badge {
            label: "In progress".into(),
            background: "#DBEAFE",
            text_color: "#1E40AF",
            marker: "#007AFF",
        },
        RequestStatus::Closed => Badge {
            label: "Closed".into(),
            background: GREY_BG,
            text_color: GREY_TEXT,
            marker: GREY_MARKER,
        },
        RequestStatus::Other(raw) => fallback_badge(raw),
    }
}

fn fallback_badge(raw: &str) -> Badge {
    let label = if raw.trim().is_empty() { "Unknown" } else { raw };
    Badge {
        label: label.to_string(),
        background: GREY_BG,
        text_color: GREY_TEXT,
        marker: GREY_MARKER,
    }
}

pub fn urgency_color(urgency: &Urgency) -> &'static str {
    match urgency {
        Urgency::Urgent => "#EF4444",
        Urgency::High => "#F59E0B",
        Urgency::Medium => "#10B981",
        Urgency::Normal | Urgency::Low | Urgency::Other(_) => GREY_TEXT,
    }
}

/// Map marker color of a worker or request by trade.
pub fn category_color(category: &Category) -> &'static str {
    match category {
        Category::Electrician => "#FF6B35",
        Category::Painter => "#4ECDC4",
        Category::Plumber => "#45B7D1",
        Category::Carpenter => "#96CEB4",
        Category::Mechanic => "#FFEAA7",
        Category::Cleaner => "#DDA0DD",
        Category::Gardener | Category::Other(_) => "#007AFF",
    }
}

pub fn interest_label(count: usize) -> String {
    match count {
        1 => "1 worker interested".to_string(),
        n => format!("{} workers interested", n),
    }
}
