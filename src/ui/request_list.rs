//! The request list screens: the client's requests, the client's bid
//! overview and the worker's explore and job lists are one component,
//! parameterized by [`ListScreenConfig`].

use crate::api::models::{
    Category, ParticipantStatus, RequestStatus, Role, ServiceRequest, Urgency, WorkerServiceRequest,
};
use crate::ui::status::{Badge, interest_label, participant_badge, request_badge, urgency_color};
use crate::utils::format_amount;

pub const ALGIERS: (f64, f64) = (36.7538, 3.0588);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Open,
    Closed,
    Pending,
    Bidding,
    Accepted,
    Completed,
}

impl StatusFilter {
    pub fn label(self) -> &'static str {
        match self {
            StatusFilter::All => "All",
            StatusFilter::Open => "Open",
            StatusFilter::Closed => "Closed",
            StatusFilter::Pending => "Pending",
            StatusFilter::Bidding => "Bidding",
            StatusFilter::Accepted => "Accepted",
            StatusFilter::Completed => "Completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let all = [
            StatusFilter::All,
            StatusFilter::Open,
            StatusFilter::Closed,
            StatusFilter::Pending,
            StatusFilter::Bidding,
            StatusFilter::Accepted,
            StatusFilter::Completed,
        ];
        all.into_iter().find(|f| f.label().eq_ignore_ascii_case(raw.trim()))
    }
}

/// A row any list screen can show.
pub trait Listed {
    fn request(&self) -> &ServiceRequest;

    /// The viewer's own participation, for worker lists.
    fn own_status(&self) -> Option<&ParticipantStatus> {
        None
    }

    fn is_completed(&self) -> bool {
        false
    }
}

impl Listed for ServiceRequest {
    fn request(&self) -> &ServiceRequest {
        self
    }
}

impl Listed for WorkerServiceRequest {
    fn request(&self) -> &ServiceRequest {
        &self.service_request
    }

    fn own_status(&self) -> Option<&ParticipantStatus> {
        Some(&self.status)
    }

    fn is_completed(&self) -> bool {
        WorkerServiceRequest::is_completed(self)
    }
}

impl StatusFilter {
    pub fn matches<T: Listed>(self, item: &T) -> bool {
        let request = item.request();
        match self {
            StatusFilter::All => true,
            StatusFilter::Open => request.status == RequestStatus::Open,
            StatusFilter::Closed => request.status == RequestStatus::Closed,
            StatusFilter::Pending => item.own_status() == Some(&ParticipantStatus::Pending),
            StatusFilter::Bidding => item.own_status() == Some(&ParticipantStatus::Bidding),
            StatusFilter::Accepted => item.own_status() == Some(&ParticipantStatus::Accepted),
            StatusFilter::Completed => item.is_completed(),
        }
    }
}

/// Differences between the list screen variants.
#[derive(Debug, Clone, PartialEq)]
pub struct ListScreenConfig {
    pub title: &'static str,
    pub role: Role,
    pub show_map: bool,
    pub status_filters: Vec<StatusFilter>,
    pub categories: Vec<Category>,
    pub show_join: bool,
}

impl ListScreenConfig {
    pub fn client_requests() -> Self {
        Self {
            title: "My service requests",
            role: Role::Client,
            show_map: false,
            status_filters: vec![StatusFilter::All, StatusFilter::Open, StatusFilter::Closed],
            categories: Category::ALL.to_vec(),
            show_join: false,
        }
    }

    pub fn client_map() -> Self {
        Self {
            title: "Requests map",
            show_map: true,
            ..Self::client_requests()
        }
    }

    pub fn worker_explore() -> Self {
        Self {
            title: "Explore service requests",
            role: Role::Worker,
            show_map: true,
            status_filters: vec![
                StatusFilter::All,
                StatusFilter::Pending,
                StatusFilter::Bidding,
                StatusFilter::Accepted,
                StatusFilter::Completed,
            ],
            categories: Vec::new(),
            show_join: true,
        }
    }

    pub fn worker_jobs() -> Self {
        Self {
            title: "My jobs",
            show_map: false,
            show_join: false,
            ..Self::worker_explore()
        }
    }

    pub fn for_role(role: Role, show_map: bool) -> Self {
        match (role, show_map) {
            (Role::Client, false) => Self::client_requests(),
            (Role::Client, true) => Self::client_map(),
            (Role::Worker, true) => Self::worker_explore(),
            (Role::Worker, false) => Self::worker_jobs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub status: StatusFilter,
    pub category: Option<Category>,
    pub search: String,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            status: StatusFilter::All,
            category: None,
            search: String::new(),
        }
    }
}

impl ListQuery {
    pub fn matches<T: Listed>(&self, item: &T) -> bool {
        let request = item.request();
        let category_ok = match &self.category {
            None => true,
            Some(category) => request
                .category
                .as_str()
                .to_lowercase()
                .contains(&category.as_str().to_lowercase()),
        };
        let needle = self.search.trim().to_lowercase();
        let search_ok = needle.is_empty()
            || request.category.as_str().to_lowercase().contains(&needle)
            || request.description.to_lowercase().contains(&needle);
        self.status.matches(item) && category_ok && search_ok
    }

    pub fn apply<'a, T: Listed>(&self, items: &'a [T]) -> Vec<&'a T> {
        items.iter().filter(|item| self.matches(*item)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl MapRegion {
    const MIN_DELTA: f64 = 0.1;

    pub fn default_region() -> Self {
        Self {
            latitude: ALGIERS.0,
            longitude: ALGIERS.1,
            latitude_delta: 0.5,
            longitude_delta: 0.5,
        }
    }

    /// Smallest region showing every point with a 20% margin.
    pub fn fit(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for (lat, lng) in points {
            bounds = Some(match bounds {
                None => (lat, lat, lng, lng),
                Some((min_lat, max_lat, min_lng, max_lng)) => (
                    min_lat.min(lat),
                    max_lat.max(lat),
                    min_lng.min(lng),
                    max_lng.max(lng),
                ),
            });
        }
        let Some((min_lat, max_lat, min_lng, max_lng)) = bounds else {
            return Self::default_region();
        };
        Self {
            latitude: (min_lat + max_lat) / 2.0,
            longitude: (min_lng + max_lng) / 2.0,
            latitude_delta: ((max_lat - min_lat) * 1.2).max(Self::MIN_DELTA),
            longitude_delta: ((max_lng - min_lng) * 1.2).max(Self::MIN_DELTA),
        }
    }
}

/// One card of a list screen, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestCard {
    pub id: i64,
    pub category: String,
    pub description: String,
    pub budget: String,
    pub urgency: Urgency,
    pub urgency_color: &'static str,
    pub badge: Badge,
    pub interest: String,
    pub location: String,
    pub created: Option<String>,
    pub join_enabled: bool,
}

impl RequestCard {
    pub fn build<T: Listed>(item: &T, config: &ListScreenConfig, is_owner: bool) -> Self {
        let request = item.request();
        let badge = match item.own_status() {
            Some(status) => participant_badge(status, item.is_completed()),
            None => request_badge(&request.status),
        };
        RequestCard {
            id: request.id,
            category: request.category.to_string(),
            description: request.description.clone(),
            budget: format_amount(request.budget),
            urgency: request.urgency.clone(),
            urgency_color: urgency_color(&request.urgency),
            badge,
            interest: interest_label(request.participants.len()),
            location: format!("Lat: {:.4}, Lng: {:.4}", request.latitude, request.longitude),
            created: request.created_at.map(|t| t.format("%Y-%m-%d").to_string()),
            join_enabled: config.show_join
                && !item.is_completed()
                && can_join(request, config.role, item.own_status(), is_owner),
        }
    }
}

/// A worker may join an open request they do not own, either unseen or
/// still pending after an invitation. Pending rows the worker already joined
/// look the same; the backend answers those with a conflict.
pub fn can_join(
    request: &ServiceRequest,
    role: Role,
    own_status: Option<&ParticipantStatus>,
    is_owner: bool,
) -> bool {
    role == Role::Worker
        && !is_owner
        && request.status == RequestStatus::Open
        && matches!(own_status, None | Some(ParticipantStatus::Pending))
}

/// Filters `items` and turns them into cards, plus the map region when the
/// screen shows a map.
pub fn list_cards<T: Listed>(
    items: &[T],
    config: &ListScreenConfig,
    query: &ListQuery,
    is_owner: impl Fn(&T) -> bool,
) -> (Vec<RequestCard>, Option<MapRegion>) {
    let visible = query.apply(items);
    let cards = visible
        .iter()
        .map(|item| RequestCard::build(*item, config, is_owner(*item)))
        .collect();
    let region = config.show_map.then(|| {
        MapRegion::fit(visible.iter().map(|item| {
            let request = item.request();
            (request.latitude, request.longitude)
        }))
    });
    (cards, region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Participant;

    fn request(id: i64, category: Category, description: &str, status: RequestStatus) -> ServiceRequest {
        ServiceRequest {
            id,
            category,
            description: description.into(),
            budget: 5000.0,
            urgency: Urgency::Normal,
            status,
            latitude: 36.7,
            longitude: 3.0,
            created_at: None,
            client_id: None,
            participants: Vec::new(),
        }
    }

    fn row(req: ServiceRequest, status: ParticipantStatus, done: bool) -> WorkerServiceRequest {
        WorkerServiceRequest {
            service_request_id: req.id,
            worker_id: 5,
            status,
            bid: 0.0,
            client_completed: done,
            worker_completed: done,
            service_request: req,
        }
    }

    #[test]
    fn invitation_to_open_request_offers_join() {
        let rows = vec![row(
            request(1, Category::Plumber, "Broken pipe", RequestStatus::Open),
            ParticipantStatus::Pending,
            false,
        )];
        let (cards, region) = list_cards(&rows, &ListScreenConfig::worker_explore(), &ListQuery::default(), |_| false);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].interest, "0 workers interested");
        assert_eq!(cards[0].badge.label, "Pending");
        assert!(cards[0].join_enabled);
        assert_eq!(region.map(|r| (r.latitude, r.longitude)), Some((36.7, 3.0)));

        let (own, _) = list_cards(&rows, &ListScreenConfig::worker_explore(), &ListQuery::default(), |_| true);
        assert!(!own[0].join_enabled);
        let (jobs, region) = list_cards(&rows, &ListScreenConfig::worker_jobs(), &ListQuery::default(), |_| false);
        assert!(!jobs[0].join_enabled);
        assert_eq!(region, None);
    }

    #[test]
    fn interest_counts_server_participants() {
        let mut req = request(1, Category::Plumber, "Broken pipe", RequestStatus::Open);
        for (n, expected) in [(1, "1 worker interested"), (3, "4 workers interested")] {
            for i in 0..n {
                req.participants.push(Participant {
                    service_request_id: 1,
                    worker_id: i,
                    status: ParticipantStatus::Pending,
                    bid: 0.0,
                    worker: None,
                });
            }
            let card = RequestCard::build(&req, &ListScreenConfig::client_requests(), true);
            assert_eq!(card.interest, expected);
        }
    }

    #[test]
    fn only_pending_rows_on_open_requests_offer_join() {
        let open = || request(2, Category::Electrician, "Wiring", RequestStatus::Open);
        let rows = vec![
            row(open(), ParticipantStatus::Pending, false),
            row(open(), ParticipantStatus::Bidding, false),
            row(open(), ParticipantStatus::Accepted, false),
            row(open(), ParticipantStatus::Pending, true),
            row(
                request(2, Category::Electrician, "Wiring", RequestStatus::Closed),
                ParticipantStatus::Pending,
                false,
            ),
        ];
        let (cards, _) = list_cards(&rows, &ListScreenConfig::worker_explore(), &ListQuery::default(), |_| false);
        let enabled: Vec<bool> = cards.iter().map(|c| c.join_enabled).collect();
        assert_eq!(enabled, vec![true, false, false, false, false]);
    }

    #[test]
    fn query_filters_by_status_category_and_search() {
        let items = vec![
            request(1, Category::Plumber, "Leaking sink", RequestStatus::Open),
            request(2, Category::Electrician, "Install lights", RequestStatus::Closed),
            request(3, Category::Plumber, "New water heater", RequestStatus::Closed),
        ];
        let q = ListQuery {
            status: StatusFilter::Closed,
            ..ListQuery::default()
        };
        assert_eq!(q.apply(&items).iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3]);

        let q = ListQuery {
            category: Some(Category::Plumber),
            search: "HEATER".into(),
            ..ListQuery::default()
        };
        assert_eq!(q.apply(&items).iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);

        let q = ListQuery {
            search: "electric".into(),
            ..ListQuery::default()
        };
        assert_eq!(q.apply(&items).len(), 1);
    }

    #[test]
    fn worker_status_filters() {
        let rows = vec![
            row(request(1, Category::Plumber, "a", RequestStatus::Open), ParticipantStatus::Pending, false),
            row(request(2, Category::Plumber, "b", RequestStatus::Open), ParticipantStatus::Bidding, false),
            row(request(3, Category::Plumber, "c", RequestStatus::Closed), ParticipantStatus::Accepted, true),
        ];
        let ids = |filter| {
            let q = ListQuery {
                status: filter,
                ..ListQuery::default()
            };
            q.apply(&rows).iter().map(|r| r.service_request_id).collect::<Vec<_>>()
        };
        assert_eq!(ids(StatusFilter::Bidding), vec![2]);
        assert_eq!(ids(StatusFilter::Accepted), vec![3]);
        assert_eq!(ids(StatusFilter::Completed), vec![3]);
        assert_eq!(ids(StatusFilter::All).len(), 3);
        assert_eq!(
            RequestCard::build(&rows[2], &ListScreenConfig::worker_jobs(), false).badge.label,
            "Completed"
        );
    }

    #[test]
    fn map_region_fits_points() {
        assert_eq!(MapRegion::fit(Vec::new()), MapRegion::default_region());

        let single = MapRegion::fit([(36.0, 3.0)]);
        assert_eq!((single.latitude, single.longitude), (36.0, 3.0));
        assert_eq!(single.latitude_delta, 0.1);

        let spread = MapRegion::fit([(36.0, 3.0), (37.0, 5.0)]);
        assert_eq!(spread.latitude, 36.5);
        assert_eq!(spread.longitude, 4.0);
        assert!((spread.latitude_delta - 1.2).abs() < 1e-9);
        assert!((spread.longitude_delta - 2.4).abs() < 1e-9);
    }

    #[test]
    fn configs_differ_only_where_screens_did() {
        assert!(ListScreenConfig::for_role(Role::Worker, true).show_join);
        assert!(!ListScreenConfig::for_role(Role::Worker, false).show_map);
        assert_eq!(ListScreenConfig::client_map().status_filters, ListScreenConfig::client_requests().status_filters);
        assert_eq!(StatusFilter::parse("bidding"), Some(StatusFilter::Bidding));
        assert_eq!(StatusFilter::parse("nope"), None);
    }
}
