use crate::api::models::{Category, NewServiceRequest, RequestStatus, Urgency};
use crate::ui::request_list::ALGIERS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("Please select a service category")]
    MissingCategory,
    #[error("Please describe what you need")]
    MissingDescription,
    #[error("Please enter a valid budget")]
    InvalidBudget,
}

/// Raw input of the "new service request" form.
#[derive(Debug, Clone, Default)]
pub struct RequestForm {
    pub category: Option<Category>,
    pub description: String,
    pub budget: String,
    pub urgency: Option<Urgency>,
    pub location: Option<(f64, f64)>,
}

impl RequestForm {
    pub fn build(&self) -> Result<NewServiceRequest, FormError> {
        let category = self.category.clone().ok_or(FormError::MissingCategory)?;
        let description = self.description.trim();
        if description.is_empty() {
            return Err(FormError::MissingDescription);
        }
        let budget: f64 = self
            .budget
            .trim()
            .parse()
            .map_err(|_| FormError::InvalidBudget)?;
        if !budget.is_finite() || budget <= 0.0 {
            return Err(FormError::InvalidBudget);
        }
        let (latitude, longitude) = self.location.unwrap_or(ALGIERS);
        Ok(NewServiceRequest {
            category,
            description: description.to_string(),
            status: RequestStatus::Open,
            budget,
            urgency: self.urgency.clone().unwrap_or(Urgency::Normal),
            latitude,
            longitude,
        })
    }
}
