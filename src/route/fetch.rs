use crate::context::UserContext;
use crate::model::{JobStatus, JobView, Region};
use crate::route::common::{success_return, RouteResult};
use crate::service::JobOrchestrator;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Route, State};
use serde::{Deserialize, Serialize};

/// Fetch request body. Without a credential the stored one is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchStartedResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Start a fetch job for the caller in `region`
///
/// Answers 409 while a job is running, 429 with `Retry-After` when rate
/// limited, 400 on a missing or malformed credential.
#[post("/fetch/<region>", data = "<request>")]
pub async fn start_fetch(
    orchestrator: &State<JobOrchestrator>,
    user: UserContext,
    region: &str,
    request: Option<Json<FetchRequest>>,
) -> RouteResult<FetchStartedResponse> {
    let region: Region = region.parse()?;
    let request = request.map(Json::into_inner).unwrap_or_default();

    let started = orchestrator
        .start_job(&user.user_id, region, request.credential.as_deref())
        .await?;
    log::debug!(
        "Fetch {} requested from {}",
        started.job_id,
        user.ip.as_deref().unwrap_or("unknown")
    );

    Ok(success_return(FetchStartedResponse {
        job_id: started.job_id,
        status: JobStatus::Pending,
    }))
}

/// Latest job of the caller in `region`, or null
#[get("/fetch/<region>/status")]
pub async fn fetch_status(
    orchestrator: &State<JobOrchestrator>,
    user: UserContext,
    region: &str,
) -> RouteResult<Option<JobView>> {
    let region: Region = region.parse()?;
    let job = orchestrator.get_status(&user.user_id, region).await?;
    Ok(success_return(job.as_ref().map(JobView::from)))
}

pub fn routes() -> Vec<Route> {
    routes![start_fetch, fetch_status]
}
