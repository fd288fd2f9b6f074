// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    handlers::{admin, auth, education, evaluation, notifications, questions, reports, students},
    permissions::{Permission, Role},
    state::AppState,
    utils::jwt::{auth_middleware, auth_token_middleware, require_permissions, require_roles},
};

#[derive(OpenApi)]
#[openapi(
    paths(crate::handlers::auth::login),
    info(title = "Exam Platform API", description = "REST backend for the exam platform")
)]
struct ApiDoc;

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, students, questions, education, admin, reports).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state.
///
/// Where every method of a path shares one requirement the guard is a route
/// layer; paths whose methods differ (e.g. GET vs DELETE on /questions/{id})
/// check the stricter permission inside the handler instead, because a merged
/// layer cannot split a path by method.
pub fn create_router(state: AppState) -> Router {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:3000"));

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh_token))
        // Reachable with a valid token even while a password change is
        // pending; that is the whole point of the lighter middleware.
        .merge(
            Router::new()
                .route("/logout", post(auth::logout))
                .route("/change-password", post(auth::change_password))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_token_middleware,
                )),
        );

    // Staff only; creation additionally requires manage_students (checked in
    // the handler).
    let student_routes = Router::new()
        .route("/", get(students::list_students).post(students::create_student))
        .route("/{id}", get(students::get_student))
        .layer(middleware::from_fn(|req, next| {
            require_roles(req, next, &[Role::SuperAdmin, Role::Admin, Role::Teacher])
        }))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let question_routes = Router::new()
        // Bank mutations
        .merge(
            Router::new()
                .route("/", post(questions::create_question))
                .route("/import", post(questions::import_questions))
                .layer(middleware::from_fn(|req, next| {
                    require_permissions(req, next, &[Permission::ManageQuestions])
                })),
        )
        .merge(
            Router::new()
                .route("/stats", get(questions::question_stats))
                .layer(middleware::from_fn(|req, next| {
                    require_roles(req, next, &[Role::SuperAdmin, Role::Admin, Role::Teacher])
                })),
        )
        // Read side and student-facing features
        .route("/search", get(questions::search_questions))
        .route("/check", post(questions::check_answer))
        .route("/ranking", get(questions::ranking))
        .route(
            "/by-subcategory/{subject_id}/{subcategory_id}",
            get(questions::list_by_subcategory),
        )
        .route(
            "/random-exam/{subject_id}/{subcategory_id}",
            get(questions::random_exam),
        )
        .route(
            "/recommendations/{student_id}",
            get(questions::recommendations),
        )
        .route(
            "/adaptive/{student_id}/{topic}",
            get(questions::adaptive_difficulty),
        )
        .route("/badges/{student_id}", get(questions::badges))
        .route(
            "/performance/{student_id}/{question_id}",
            get(questions::performance_analysis),
        )
        // Mutating methods on this path re-check manage_questions themselves.
        .route(
            "/{id}",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let education_routes = Router::new()
        .route("/subjects", get(education::get_subjects))
        // POST re-checks manage_courses in the handler.
        .route("/exams", get(education::list_exams).post(education::create_exam))
        .route("/exams/{id}", get(education::get_exam))
        // Session lifecycle, student side
        .merge(
            Router::new()
                .route("/exams/{id}/start", post(education::start_exam))
                .route("/sessions/{id}", get(education::get_session))
                .route("/sessions/{id}/pause", post(education::pause_session))
                .route("/sessions/{id}/resume", post(education::resume_session))
                .route("/sessions/{id}/submit", post(education::submit_exam))
                .route("/sessions/{id}/appeal", post(evaluation::create_appeal))
                // Scoped to the caller's own monitoring window in the handler.
                .route(
                    "/sessions/{id}/events",
                    post(education::record_monitoring_event),
                )
                .layer(middleware::from_fn(|req, next| {
                    require_roles(req, next, &[Role::Student])
                })),
        )
        // Owner-or-staff check lives in the handler.
        .route("/sessions/{id}/score", get(evaluation::get_score))
        // Grading and oversight
        .merge(
            Router::new()
                .route("/sessions/{id}/answers", get(evaluation::list_answers))
                .route("/sessions/{id}/review", post(evaluation::review_answer))
                .route("/exams/{id}/curve", post(evaluation::apply_curve))
                .layer(middleware::from_fn(|req, next| {
                    require_permissions(req, next, &[Permission::ManageGrades])
                })),
        )
        .merge(
            Router::new()
                .route("/exams/{id}/analytics", get(evaluation::exam_analytics))
                .route("/sessions/{id}/analysis", get(education::session_analysis))
                .layer(middleware::from_fn(|req, next| {
                    require_permissions(req, next, &[Permission::ViewAnalytics])
                })),
        )
        .merge(
            Router::new()
                .route("/cache/flush", post(education::flush_cache))
                .route("/notifications", post(education::send_notification))
                .layer(middleware::from_fn(|req, next| {
                    require_roles(req, next, &[Role::SuperAdmin, Role::Admin])
                })),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        // Administrator accounts are super-admin territory.
        .merge(
            Router::new()
                .route("/admins", get(admin::list_admins).post(admin::create_admin))
                .route(
                    "/admins/{id}",
                    put(admin::update_admin).delete(admin::delete_admin),
                )
                .layer(middleware::from_fn(|req, next| {
                    require_roles(req, next, &[Role::SuperAdmin])
                })),
        )
        .merge(
            Router::new()
                .route(
                    "/templates",
                    get(admin::list_templates).post(admin::create_template),
                )
                .route("/templates/{id}/generate", post(admin::generate_exam))
                .route("/schedules", post(admin::schedule_exam))
                .route("/groups", get(admin::list_groups).post(admin::create_group))
                .route("/groups/{id}/students", put(admin::assign_students))
                .route("/stats", get(admin::dashboard_stats))
                .layer(middleware::from_fn(|req, next| {
                    require_permissions(req, next, &[Permission::ManageCourses])
                })),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let report_routes = Router::new()
        .merge(
            Router::new()
                .route("/audit", get(reports::audit_logs))
                .layer(middleware::from_fn(|req, next| {
                    require_permissions(req, next, &[Permission::ViewAuditLogs])
                })),
        )
        .merge(
            Router::new()
                .route("/admin-activity", get(reports::admin_activity_report))
                .route("/sessions/{id}", get(reports::student_exam_report))
                .route(
                    "/exams/{exam_id}/groups/{group_id}",
                    get(reports::group_exam_report),
                )
                .layer(middleware::from_fn(|req, next| {
                    require_permissions(req, next, &[Permission::GenerateReports])
                })),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Token is checked inside the handler (query param), not by middleware.
    let notification_routes = Router::new().route("/ws", get(notifications::ws_handler));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/students", student_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/education", education_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/reports", report_routes)
        .nest("/api/notifications", notification_routes)
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
