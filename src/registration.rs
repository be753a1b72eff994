//! Sign-up wizard. Each step takes the draft by value and hands back a new
//! one, so a half-filled draft can always be inspected or resumed.

use serde::{Deserialize, Serialize};

use crate::api::models::Role;

pub const EXPERTISE_FIELDS: [&str; 12] = [
    "Electrician",
    "Plumber",
    "Carpenter",
    "HVAC Technician",
    "Welder",
    "Painter",
    "Mason",
    "Roofer",
    "Landscaper",
    "Solar Installer",
    "Appliance Repair",
    "Handyman",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Role,
    Account,
    Phone,
    Expertise,
    Location,
    Identity,
    Review,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("expected input for the {expected:?} step")]
    UnexpectedInput { expected: WizardStep },
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("invalid phone number")]
    InvalidPhone,
    #[error("unknown field of expertise: {0}")]
    UnknownExpertise(String),
    #[error("registration is not finished")]
    Incomplete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDraft {
    pub role: Option<Role>,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub expertise: Option<String>,
    pub wilaya: String,
    pub baladiya: String,
    pub id_card: Option<String>,
    pub freelancer_card: Option<String>,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    Role(Role),
    Account {
        full_name: String,
        email: String,
        password: String,
        confirm_password: String,
    },
    Phone(String),
    Expertise(String),
    Location {
        wilaya: String,
        baladiya: String,
    },
    Identity {
        id_card: Option<String>,
        freelancer_card: Option<String>,
    },
    Review {
        bio: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wizard {
    step: WizardStep,
    draft: RegistrationDraft,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

fn required(value: &str, field: &'static str) -> Result<String, WizardError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(WizardError::Missing(field))
    } else {
        Ok(trimmed.to_string())
    }
}

impl Wizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::Role,
            draft: RegistrationDraft::default(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &RegistrationDraft {
        &self.draft
    }

    fn is_worker(&self) -> bool {
        self.draft.role == Some(Role::Worker)
    }

    fn next_step(&self) -> WizardStep {
        match self.step {
            WizardStep::Role => WizardStep::Account,
            WizardStep::Account => WizardStep::Phone,
            WizardStep::Phone if self.is_worker() => WizardStep::Expertise,
            WizardStep::Phone | WizardStep::Expertise => WizardStep::Location,
            WizardStep::Location if self.is_worker() => WizardStep::Identity,
            WizardStep::Location | WizardStep::Identity => WizardStep::Review,
            WizardStep::Review | WizardStep::Done => WizardStep::Done,
        }
    }

    fn previous_step(&self) -> WizardStep {
        match self.step {
            WizardStep::Role | WizardStep::Account => WizardStep::Role,
            WizardStep::Phone => WizardStep::Account,
            WizardStep::Expertise => WizardStep::Phone,
            WizardStep::Location if self.is_worker() => WizardStep::Expertise,
            WizardStep::Location => WizardStep::Phone,
            WizardStep::Identity => WizardStep::Location,
            WizardStep::Review if self.is_worker() => WizardStep::Identity,
            WizardStep::Review => WizardStep::Location,
            WizardStep::Done => WizardStep::Review,
        }
    }

    /// Goes back one step; whatever was entered so far is kept.
    pub fn back(self) -> Self {
        Self {
            step: self.previous_step(),
            draft: self.draft,
        }
    }

    pub fn advance(self, input: StepInput) -> Result<Self, WizardError> {
        let mut draft = self.draft.clone();
        match (self.step, input) {
            (WizardStep::Role, StepInput::Role(role)) => {
                draft.role = Some(role);
            }
            (
                WizardStep::Account,
                StepInput::Account {
                    full_name,
                    email,
                    password,
                    confirm_password,
                },
            ) => {
                draft.full_name = required(&full_name, "full name")?;
                let email = required(&email, "email")?;
                if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
                    return Err(WizardError::InvalidEmail);
                }
                draft.email = email;
                if password.is_empty() {
                    return Err(WizardError::Missing("password"));
                }
                if password != confirm_password {
                    return Err(WizardError::PasswordMismatch);
                }
                draft.password = password;
            }
            (WizardStep::Phone, StepInput::Phone(phone)) => {
                let phone = required(&phone, "phone number")?;
                let digits = phone.chars().filter(char::is_ascii_digit).count();
                let allowed = phone
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == '+' || c == ' ');
                if !allowed || digits < 6 {
                    return Err(WizardError::InvalidPhone);
                }
                draft.phone_number = phone;
            }
            (WizardStep::Expertise, StepInput::Expertise(field)) => {
                let field = required(&field, "field of expertise")?;
                let known = EXPERTISE_FIELDS
                    .iter()
                    .find(|f| f.eq_ignore_ascii_case(&field))
                    .ok_or(WizardError::UnknownExpertise(field))?;
                draft.expertise = Some(known.to_string());
            }
            (WizardStep::Location, StepInput::Location { wilaya, baladiya }) => {
                draft.wilaya = required(&wilaya, "wilaya")?;
                draft.baladiya = required(&baladiya, "baladiya")?;
            }
            (
                WizardStep::Identity,
                StepInput::Identity {
                    id_card,
                    freelancer_card,
                },
            ) => {
                let id_card = id_card.as_deref().map(str::trim).unwrap_or_default();
                draft.id_card = Some(required(id_card, "ID card")?);
                draft.freelancer_card = freelancer_card.filter(|c| !c.trim().is_empty());
            }
            (WizardStep::Review, StepInput::Review { bio }) => {
                draft.bio = bio.trim().to_string();
            }
            (expected, _) => return Err(WizardError::UnexpectedInput { expected }),
        }
        let next = Wizard {
            step: self.step,
            draft,
        };
        Ok(Wizard {
            step: next.next_step(),
            draft: next.draft,
        })
    }

    /// Builds the registration request once every step is through.
    pub fn payload(&self) -> Result<RegisterPayload, WizardError> {
        if self.step != WizardStep::Done {
            return Err(WizardError::Incomplete);
        }
        let d = &self.draft;
        match d.role {
            Some(Role::Worker) => Ok(RegisterPayload::Worker(WorkerRegistration {
                full_name: d.full_name.clone(),
                email: d.email.clone(),
                password: d.password.clone(),
                phone_number: d.phone_number.clone(),
                wilaya: d.wilaya.clone(),
                baladiya: d.baladiya.clone(),
                genre: d.expertise.clone().ok_or(WizardError::Missing("field of expertise"))?,
                id_card: d.id_card.clone().ok_or(WizardError::Missing("ID card"))?,
                freelancer_card: d.freelancer_card.clone(),
                bio: d.bio.clone(),
            })),
            Some(Role::Client) => Ok(RegisterPayload::Client(ClientRegistration {
                full_name: d.full_name.clone(),
                email: d.email.clone(),
                password: d.password.clone(),
                phone_number: d.phone_number.clone(),
                wilaya: d.wilaya.clone(),
                baladiya: d.baladiya.clone(),
            })),
            None => Err(WizardError::Missing("role")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRegistration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub wilaya: String,
    #[serde(rename = "baladia")]
    pub baladiya: String,
    pub genre: String,
    pub id_card: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freelancer_card: Option<String>,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub wilaya: String,
    #[serde(rename = "baladia")]
    pub baladiya: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RegisterPayload {
    Worker(WorkerRegistration),
    Client(ClientRegistration),
}

impl RegisterPayload {
    pub fn role(&self) -> Role {
        match self {
            RegisterPayload::Worker(_) => Role::Worker,
            RegisterPayload::Client(_) => Role::Client,
        }
    }
}

/// A whole sign-up written down in one file, replayed through the wizard.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub role: Option<Role>,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub phone_number: String,
    pub expertise: String,
    pub wilaya: String,
    pub baladiya: String,
    pub id_card: Option<String>,
    pub freelancer_card: Option<String>,
    pub bio: String,
}

impl RegistrationForm {
    pub fn run(self) -> Result<RegisterPayload, WizardError> {
        let mut wizard = Wizard::new();
        while wizard.step() != WizardStep::Done {
            let input = match wizard.step() {
                WizardStep::Role => StepInput::Role(self.role.ok_or(WizardError::Missing("role"))?),
                WizardStep::Account => StepInput::Account {
                    full_name: self.full_name.clone(),
                    email: self.email.clone(),
                    password: self.password.clone(),
                    confirm_password: self.confirm_password.clone(),
                },
                WizardStep::Phone => StepInput::Phone(self.phone_number.clone()),
                WizardStep::Expertise => StepInput::Expertise(self.expertise.clone()),
                WizardStep::Location => StepInput::Location {
                    wilaya: self.wilaya.clone(),
                    baladiya: self.baladiya.clone(),
                },
                WizardStep::Identity => StepInput::Identity {
                    id_card: self.id_card.clone(),
                    freelancer_card: self.freelancer_card.clone(),
                },
                WizardStep::Review => StepInput::Review {
                    bio: self.bio.clone(),
                },
                WizardStep::Done => break,
            };
            wizard = wizard.advance(input)?;
        }
        wizard.payload()
    }
}
