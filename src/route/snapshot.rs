use crate::context::UserContext;
use crate::error::MaiError;
use crate::model::{Region, Snapshot};
use crate::route::common::{success_return, RouteResult};
use crate::service::{Best50, SnapshotService};
use rocket::{get, routes, Route, State};

/// Snapshot history of the caller in `region`, newest first
#[get("/snapshots/<region>")]
pub async fn list_snapshots(
    snapshots: &State<SnapshotService>,
    user: UserContext,
    region: &str,
) -> RouteResult<Vec<Snapshot>> {
    let region: Region = region.parse()?;
    Ok(success_return(snapshots.list(&user.user_id, region).await?))
}

/// Ranked Best 50 of one of the caller's snapshots
#[get("/snapshot/<id>/best50")]
pub async fn snapshot_best50(
    snapshots: &State<SnapshotService>,
    user: UserContext,
    id: &str,
) -> RouteResult<Best50> {
    let best = snapshots.best50(id).await?;
    if best.snapshot.user_id != user.user_id {
        return Err(MaiError::no_data(format!("Snapshot {id} not found")));
    }
    Ok(success_return(best))
}

pub fn routes() -> Vec<Route> {
    routes![list_snapshots, snapshot_best50]
}
