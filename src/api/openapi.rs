//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{
    auth, books, borrow_requests, donations, health, issues, penalties, stats, students,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "Campus library lending REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register_student,
        auth::login_student,
        auth::register_librarian,
        auth::login_librarian,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::reconcile_copies,
        // Borrow requests
        borrow_requests::list_borrow_requests,
        borrow_requests::submit_borrow_request,
        borrow_requests::approve_borrow_request,
        borrow_requests::reject_borrow_request,
        borrow_requests::mark_as_taken,
        // Issues
        issues::list_issues,
        issues::get_issue,
        issues::issue_book,
        issues::return_book,
        // Donations
        donations::list_donations,
        donations::submit_donation,
        donations::review_donation,
        // Penalties
        penalties::compute_penalties,
        penalties::due_alerts,
        penalties::overdue_students,
        penalties::student_penalties,
        // Students
        students::get_my_profile,
        students::update_my_profile,
        students::my_history,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Auth
            auth::StudentLoginRequest,
            auth::LibrarianLoginRequest,
            crate::services::auth::AuthResponse,
            crate::services::auth::Profile,
            crate::models::enums::Role,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::CopyAdjustment,
            crate::models::enums::BookStatus,
            // Students and librarians
            crate::models::student::Student,
            crate::models::student::RegisterStudent,
            crate::models::student::UpdateStudentProfile,
            crate::models::student::StudentPenaltySummary,
            crate::models::librarian::Librarian,
            crate::models::librarian::RegisterLibrarian,
            crate::services::students::BorrowingHistory,
            // Borrow requests
            crate::models::borrow_request::BorrowRequest,
            crate::models::borrow_request::BorrowRequestDetails,
            crate::models::borrow_request::SubmitBorrowRequest,
            crate::models::borrow_request::ApproveBorrowRequest,
            crate::models::borrow_request::MarkAsTaken,
            crate::models::enums::RequestStatus,
            // Issues
            crate::models::issue::IssueRecord,
            crate::models::issue::IssueRecordDetails,
            crate::models::issue::IssueBookDirect,
            crate::models::enums::IssueStatus,
            // Donations
            crate::models::donation::Donation,
            crate::models::donation::SubmitDonation,
            crate::models::donation::ReviewDonation,
            crate::models::donation::ReviewDecision,
            crate::models::donation::DonationReview,
            // Penalties
            penalties::PenaltyQuery,
            crate::services::penalty::PenaltyReport,
            crate::services::penalty::StudentPenaltyTotal,
            crate::services::penalty::DueAlert,
            crate::services::penalty::AlertLevel,
            crate::services::penalty::OverdueEntry,
            // Stats
            stats::StatsResponse,
            stats::BookStats,
            stats::LoanStats,
            stats::PendingStats,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and login"),
        (name = "books", description = "Catalog management"),
        (name = "borrow-requests", description = "Borrow request workflow"),
        (name = "issues", description = "Issue ledger"),
        (name = "donations", description = "Book donations"),
        (name = "penalties", description = "Overdue penalties and alerts"),
        (name = "students", description = "Student self-service"),
        (name = "stats", description = "Statistics")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_declares_bearer_scheme_and_lifecycle_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/borrow-requests/{id}/approve"));
        assert!(doc.paths.paths.contains_key("/issues/{id}/return"));
    }
}
