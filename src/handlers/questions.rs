// src/handlers/questions.rs
//
// Question bank: CRUD, bulk import, search, answer checking, random exam
// generation and the recommendation stubs backed by the in-memory profiles.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::CACHE_TTL_SECS,
    error::AppError,
    models::{
        question::{
            CheckAnswerRequest, CreateQuestionRequest, PublicQuestion, Question, SearchParams,
            UpdateQuestionRequest, is_open_ended,
        },
        subject::subcategory_info,
    },
    permissions::Permission,
    services::{
        cache::{performance_key, questions_key},
        notifier::Notification,
    },
    state::AppState,
    utils::jwt::{Claims, ensure_permissions},
};

/// Column list shared by every query that hydrates a full `Question`.
const QUESTION_COLUMNS: &str = "id, subject_id, subcategory_id, question_type, content, options, \
                                correct_answer, points, difficulty, created_by, created_at";

fn check_catalog(subject_id: &str, subcategory_id: &str) -> Result<(), AppError> {
    subcategory_info(subject_id, subcategory_id)
        .map(|_| ())
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Unknown subject/subcategory combination '{}/{}'",
                subject_id, subcategory_id
            ))
        })
}

async fn insert_question(
    pool: &PgPool,
    payload: &CreateQuestionRequest,
    created_by: i64,
) -> Result<Question, AppError> {
    let question = sqlx::query_as::<_, Question>(&format!(
        r#"
        INSERT INTO questions
            (subject_id, subcategory_id, question_type, content, options,
             correct_answer, points, difficulty, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {QUESTION_COLUMNS}
        "#
    ))
    .bind(&payload.subject_id)
    .bind(&payload.subcategory_id)
    .bind(&payload.question_type)
    .bind(&payload.content)
    .bind(SqlJson(&payload.options))
    .bind(&payload.correct_answer)
    .bind(payload.points)
    .bind(payload.difficulty)
    .bind(created_by)
    .fetch_one(pool)
    .await?;

    Ok(question)
}

/// Creates a question, invalidates the affected listing cache, and pushes a
/// notification to clients subscribed to the subcategory topic.
pub async fn create_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    check_catalog(&payload.subject_id, &payload.subcategory_id)?;

    let question = insert_question(&state.pool, &payload, claims.user_id()?).await?;

    state
        .cache
        .del(&questions_key(&question.subject_id, &question.subcategory_id))
        .await;

    state.notifier.notify_subscribers(
        &format!(
            "questions/{}/{}",
            question.subject_id, question.subcategory_id
        ),
        &Notification::new(
            "new_question",
            "New question available",
            json!({ "questionId": question.id }),
        ),
    );

    Ok((StatusCode::CREATED, Json(json!({ "data": question }))))
}

pub async fn get_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(json!({ "data": question })))
}

/// Lists the questions of one subcategory, cache-aside with invalidation on
/// every mutation of the bank.
pub async fn list_by_subcategory(
    State(state): State<AppState>,
    Path((subject_id, subcategory_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    check_catalog(&subject_id, &subcategory_id)?;

    let key = questions_key(&subject_id, &subcategory_id);
    if let Some(cached) = state.cache.get::<serde_json::Value>(&key).await {
        return Ok(Json(json!({ "data": cached, "cached": true })));
    }

    let questions = sqlx::query_as::<_, Question>(&format!(
        r#"
        SELECT {QUESTION_COLUMNS} FROM questions
        WHERE subject_id = $1 AND subcategory_id = $2
        ORDER BY id
        "#
    ))
    .bind(&subject_id)
    .bind(&subcategory_id)
    .fetch_all(&state.pool)
    .await?;

    let data = json!(questions);
    state.cache.set(&key, &data, CACHE_TTL_SECS).await;

    Ok(Json(json!({ "data": data, "cached": false })))
}

pub async fn update_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_permissions(&claims, &[Permission::ManageQuestions])?;

    if let Some(question_type) = &payload.question_type {
        if !crate::models::question::QUESTION_TYPES.contains(&question_type.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Unknown question type '{question_type}'"
            )));
        }
    }
    if let Some(difficulty) = payload.difficulty {
        if !(1..=5).contains(&difficulty) {
            return Err(AppError::BadRequest(
                "Difficulty must be between 1 and 5".to_string(),
            ));
        }
    }

    let question = sqlx::query_as::<_, Question>(&format!(
        r#"
        UPDATE questions SET
            question_type = COALESCE($2, question_type),
            content = COALESCE($3, content),
            options = COALESCE($4, options),
            correct_answer = COALESCE($5, correct_answer),
            points = COALESCE($6, points),
            difficulty = COALESCE($7, difficulty)
        WHERE id = $1
        RETURNING {QUESTION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&payload.question_type)
    .bind(&payload.content)
    .bind(payload.options.as_ref().map(SqlJson))
    .bind(&payload.correct_answer)
    .bind(payload.points)
    .bind(payload.difficulty)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    state
        .cache
        .del(&questions_key(&question.subject_id, &question.subcategory_id))
        .await;

    Ok(Json(json!({ "data": question })))
}

pub async fn delete_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_permissions(&claims, &[Permission::ManageQuestions])?;

    let deleted: Option<(String, String)> = sqlx::query_as(
        "DELETE FROM questions WHERE id = $1 RETURNING subject_id, subcategory_id",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let (subject_id, subcategory_id) =
        deleted.ok_or(AppError::NotFound("Question not found".to_string()))?;

    state
        .cache
        .del(&questions_key(&subject_id, &subcategory_id))
        .await;

    Ok(Json(json!({ "message": "Question deleted" })))
}

const IMPORT_CSV_TEMPLATE: &str = "subjectId,subcategoryId,type,content,options,correctAnswer,points,difficulty\n\
     math,algebra,multiple_choice,\"2x + 3 = 7. x = ?\",\"2|3|4\",2,1.0,1\n";

/// Bulk import. Each row is validated independently; the response reports a
/// success/failure entry per row so a partial import is visible to the caller.
pub async fn import_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<Vec<CreateQuestionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "No questions to import. Expected rows shaped like:\n{IMPORT_CSV_TEMPLATE}"
        )));
    }

    let created_by = claims.user_id()?;
    let mut imported = Vec::new();
    let mut failed = Vec::new();

    for (index, row) in payload.iter().enumerate() {
        let outcome = async {
            row.validate()
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            check_catalog(&row.subject_id, &row.subcategory_id)?;
            insert_question(&state.pool, row, created_by).await
        }
        .await;

        match outcome {
            Ok(question) => imported.push(json!({ "row": index, "id": question.id })),
            Err(e) => failed.push(json!({ "row": index, "error": e.to_string() })),
        }
    }

    // One invalidation per touched listing is enough.
    let mut touched: Vec<(String, String)> = payload
        .iter()
        .map(|r| (r.subject_id.clone(), r.subcategory_id.clone()))
        .collect();
    touched.sort();
    touched.dedup();
    for (subject_id, subcategory_id) in &touched {
        state
            .cache
            .del(&questions_key(subject_id, subcategory_id))
            .await;
    }

    Ok(Json(json!({
        "imported": imported,
        "failed": failed,
        "total": payload.len(),
    })))
}

/// Search with dynamic filters. Filters compose with AND; text search matches
/// the question content case-insensitively.
pub async fn search_questions(
    State(pool): State<PgPool>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder = QueryBuilder::<sqlx::Postgres>::new(format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE 1=1"
    ));

    if let Some(subject_id) = &params.subject_id {
        builder.push(" AND subject_id = ").push_bind(subject_id);
    }
    if let Some(subcategory_id) = &params.subcategory_id {
        builder
            .push(" AND subcategory_id = ")
            .push_bind(subcategory_id);
    }
    if let Some(difficulty) = params.difficulty {
        builder.push(" AND difficulty = ").push_bind(difficulty);
    }
    if let Some(question_type) = &params.question_type {
        builder
            .push(" AND question_type = ")
            .push_bind(question_type);
    }
    if let Some(search) = &params.search {
        builder
            .push(" AND content ILIKE ")
            .push_bind(format!("%{search}%"));
    }

    builder.push(" ORDER BY id");
    builder
        .push(" LIMIT ")
        .push_bind(params.limit.unwrap_or(50).clamp(1, 200));
    builder
        .push(" OFFSET ")
        .push_bind(params.offset.unwrap_or(0).max(0));

    let questions: Vec<Question> = builder.build_query_as().fetch_all(&pool).await?;

    Ok(Json(json!({ "data": questions })))
}

/// Checks one answer against the stored key. Essay questions cannot be
/// auto-checked and report pending review instead of a verdict.
pub async fn check_answer(
    State(pool): State<PgPool>,
    Json(payload): Json<CheckAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
    ))
    .bind(payload.question_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    if is_open_ended(&question.question_type) {
        return Ok(Json(json!({
            "questionId": question.id,
            "pendingReview": true,
        })));
    }

    Ok(Json(json!({
        "questionId": question.id,
        "correct": payload.answer == question.correct_answer,
        "pendingReview": false,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomExamParams {
    pub count: Option<i64>,
}

/// Draws a random question set from one subcategory, correct answers stripped.
pub async fn random_exam(
    State(pool): State<PgPool>,
    Path((subject_id, subcategory_id)): Path<(String, String)>,
    Query(params): Query<RandomExamParams>,
) -> Result<impl IntoResponse, AppError> {
    check_catalog(&subject_id, &subcategory_id)?;
    let count = params.count.unwrap_or(10).clamp(1, 100);

    let questions = sqlx::query_as::<_, Question>(&format!(
        r#"
        SELECT {QUESTION_COLUMNS} FROM questions
        WHERE subject_id = $1 AND subcategory_id = $2
        ORDER BY RANDOM()
        LIMIT $3
        "#
    ))
    .bind(&subject_id)
    .bind(&subcategory_id)
    .bind(count)
    .fetch_all(&pool)
    .await?;

    if questions.is_empty() {
        return Err(AppError::NotFound(
            "No questions available for this subcategory".to_string(),
        ));
    }

    let public: Vec<PublicQuestion> = questions.into_iter().map(PublicQuestion::from).collect();
    Ok(Json(json!({ "data": public })))
}

pub async fn recommendations(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(json!({
        "data": state.recommender.recommendations(student_id)
    })))
}

/// Predicted next-question difficulty for a student and topic.
pub async fn adaptive_difficulty(
    State(state): State<AppState>,
    Path((student_id, topic)): Path<(i64, String)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(json!({
        "studentId": student_id,
        "topic": topic,
        "difficulty": state.recommender.predict_difficulty(student_id, &topic),
    })))
}

pub async fn badges(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(json!({ "data": state.recommender.badges(student_id) })))
}

/// Top students ranked by their average graded score.
pub async fn ranking(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<(i64, Option<f64>, i64)> = sqlx::query_as(
        r#"
        SELECT student_id, AVG(total_score), COUNT(*)
        FROM exam_sessions
        WHERE status = 'graded'
        GROUP BY student_id
        ORDER BY AVG(total_score) DESC NULLS LAST
        LIMIT 20
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let ranking: Vec<_> = rows
        .into_iter()
        .enumerate()
        .map(|(i, (student_id, avg, exams))| {
            json!({
                "position": i + 1,
                "studentId": student_id,
                "averageScore": avg,
                "examsTaken": exams,
            })
        })
        .collect();

    Ok(Json(json!({ "data": ranking })))
}

/// How one student has historically done on one question, cache-aside.
pub async fn performance_analysis(
    State(state): State<AppState>,
    Path((student_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let key = performance_key(student_id, question_id);
    if let Some(cached) = state.cache.get::<serde_json::Value>(&key).await {
        return Ok(Json(json!({ "data": cached, "cached": true })));
    }

    let (attempts, correct): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(*) FILTER (WHERE a.is_correct)
        FROM answers a
        JOIN exam_sessions s ON a.session_id = s.id
        WHERE s.student_id = $1 AND a.question_id = $2
        "#,
    )
    .bind(student_id)
    .bind(question_id)
    .fetch_one(&state.pool)
    .await?;

    let success_rate = if attempts > 0 {
        correct as f64 / attempts as f64
    } else {
        0.0
    };

    let data = json!({
        "studentId": student_id,
        "questionId": question_id,
        "attempts": attempts,
        "correct": correct,
        "successRate": success_rate,
    });
    state.cache.set(&key, &data, CACHE_TTL_SECS).await;

    Ok(Json(json!({ "data": data, "cached": false })))
}

/// Bank-wide counts grouped by subject and type.
pub async fn question_stats(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let by_subject: Vec<(String, String, i64)> = sqlx::query_as(
        r#"
        SELECT subject_id, subcategory_id, COUNT(*)
        FROM questions
        GROUP BY subject_id, subcategory_id
        ORDER BY subject_id, subcategory_id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let by_type: Vec<(String, i64)> = sqlx::query_as(
        "SELECT question_type, COUNT(*) FROM questions GROUP BY question_type ORDER BY question_type",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "bySubcategory": by_subject
            .into_iter()
            .map(|(subject, subcategory, count)| json!({
                "subjectId": subject,
                "subcategoryId": subcategory,
                "count": count,
            }))
            .collect::<Vec<_>>(),
        "byType": by_type
            .into_iter()
            .map(|(question_type, count)| json!({ "type": question_type, "count": count }))
            .collect::<Vec<_>>(),
    })))
}
