use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Dashboard role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SalesDirector,
    SalesAgent,
    FinanceOfficer,
    Partner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SalesDirector => "sales_director",
            Role::SalesAgent => "sales_agent",
            Role::FinanceOfficer => "finance_officer",
            Role::Partner => "partner",
        }
    }

    pub fn can(&self, action: Action) -> bool {
        use Action::*;
        use Role::*;

        match action {
            ManageUsers | DecideQuotation | DeleteRecords => *self == Admin,
            CreateQuotation => matches!(self, Admin | SalesDirector | SalesAgent | Partner),
            ViewAllQuotations => matches!(self, Admin | SalesDirector | FinanceOfficer),
            EditAnyQuotation => matches!(self, Admin | SalesDirector),
            ManageClients => !matches!(self, Partner),
            ViewInvoices => !matches!(self, Partner),
            ViewAllInvoices => matches!(self, Admin | SalesDirector | FinanceOfficer),
            ManageInvoices => matches!(self, Admin | FinanceOfficer),
            ViewReports => matches!(self, Admin | SalesDirector | FinanceOfficer),
        }
    }
}

/// Things a role may or may not do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ManageUsers,
    CreateQuotation,
    ViewAllQuotations,
    EditAnyQuotation,
    DecideQuotation,
    ManageClients,
    ViewInvoices,
    ViewAllInvoices,
    ManageInvoices,
    ViewReports,
    DeleteRecords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

/// Database user model
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// JSON representation of a user for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            status: user.status,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub role: Role,
    #[validate(length(min = 8))]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

/// A freshly created user together with the password it was given
#[derive(Debug, Serialize)]
pub struct CreatedUser {
    pub user: UserDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}

/// Login request from the dashboard
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response to the dashboard
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserDto,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePassword {
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_decides_quotations() {
        assert!(Role::Admin.can(Action::DecideQuotation));
        for role in [
            Role::SalesDirector,
            Role::SalesAgent,
            Role::FinanceOfficer,
            Role::Partner,
        ] {
            assert!(!role.can(Action::DecideQuotation), "{:?}", role);
        }
    }

    #[test]
    fn partner_is_limited_to_quotations() {
        assert!(Role::Partner.can(Action::CreateQuotation));
        assert!(!Role::Partner.can(Action::ViewAllQuotations));
        assert!(!Role::Partner.can(Action::ViewInvoices));
        assert!(!Role::Partner.can(Action::ManageClients));
    }

    #[test]
    fn finance_manages_invoices_but_cannot_quote() {
        assert!(Role::FinanceOfficer.can(Action::ManageInvoices));
        assert!(Role::FinanceOfficer.can(Action::ViewReports));
        assert!(!Role::FinanceOfficer.can(Action::CreateQuotation));
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::SalesDirector).unwrap();
        assert_eq!(json, "\"sales_director\"");
        assert_eq!(Role::FinanceOfficer.as_str(), "finance_officer");
    }
}
