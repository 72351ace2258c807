//! Onboarding step catalogue: the fixed, ordered list of setup steps.

use serde::{Deserialize, Serialize};

/// Number of steps in the wizard.
pub const STEP_COUNT: u8 = 8;

/// The setup steps, in order. Step ids are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Workspace,
    Email,
    ContactForm,
    Bookings,
    Forms,
    Inventory,
    Staff,
    Activate,
}

/// Every step, ordered by id.
pub const ALL_STEPS: [StepKind; STEP_COUNT as usize] = [
    StepKind::Workspace,
    StepKind::Email,
    StepKind::ContactForm,
    StepKind::Bookings,
    StepKind::Forms,
    StepKind::Inventory,
    StepKind::Staff,
    StepKind::Activate,
];

/// How a step indicator renders relative to the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Complete,
    Current,
    Locked,
}

impl StepKind {
    pub fn id(self) -> u8 {
        match self {
            Self::Workspace => 1,
            Self::Email => 2,
            Self::ContactForm => 3,
            Self::Bookings => 4,
            Self::Forms => 5,
            Self::Inventory => 6,
            Self::Staff => 7,
            Self::Activate => 8,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        id.checked_sub(1)
            .and_then(|i| ALL_STEPS.get(usize::from(i)))
            .copied()
    }

    /// Map a persisted progress marker onto a step; out-of-range markers
    /// land on the nearest end.
    pub fn clamped(id: u8) -> Self {
        Self::from_id(id.clamp(1, STEP_COUNT)).unwrap_or(Self::Workspace)
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Workspace => "Workspace",
            Self::Email => "Email",
            Self::ContactForm => "Contact Form",
            Self::Bookings => "Bookings",
            Self::Forms => "Forms",
            Self::Inventory => "Inventory",
            Self::Staff => "Staff",
            Self::Activate => "Activate",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Workspace => "Set up your business details",
            Self::Email => "Connect email integration",
            Self::ContactForm => "Create a public contact form",
            Self::Bookings => "Set up services & availability",
            Self::Forms => "Create post-booking forms",
            Self::Inventory => "Track resources & stock",
            Self::Staff => "Invite team members",
            Self::Activate => "Go live!",
        }
    }

    /// Steps between the first and the last can be skipped.
    pub fn can_skip(self) -> bool {
        !matches!(self, Self::Workspace | Self::Activate)
    }

    pub fn next(self) -> Option<Self> {
        Self::from_id(self.id() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_id(self.id() - 1)
    }

    /// A step is locked while it lies ahead of `current`.
    pub fn is_locked(self, current: Self) -> bool {
        current.id() < self.id()
    }

    pub fn indicator(self, current: Self) -> Indicator {
        match current.id().cmp(&self.id()) {
            std::cmp::Ordering::Greater => Indicator::Complete,
            std::cmp::Ordering::Equal => Indicator::Current,
            std::cmp::Ordering::Less => Indicator::Locked,
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Workspace => "workspace",
            Self::Email => "email",
            Self::ContactForm => "contact_form",
            Self::Bookings => "bookings",
            Self::Forms => "forms",
            Self::Inventory => "inventory",
            Self::Staff => "staff",
            Self::Activate => "activate",
        };
        write!(f, "{s}")
    }
}

/// One step indicator, as the stepper renders it.
#[derive(Debug, Clone, Serialize)]
pub struct StepInfo {
    pub id: u8,
    pub kind: StepKind,
    pub title: &'static str,
    pub description: &'static str,
    pub indicator: Indicator,
}

/// The full stepper relative to `current`.
pub fn stepper(current: StepKind) -> Vec<StepInfo> {
    ALL_STEPS
        .iter()
        .map(|&kind| StepInfo {
            id: kind.id(),
            kind,
            title: kind.title(),
            description: kind.description(),
            indicator: kind.indicator(current),
        })
        .collect()
}
