use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::job_queue::JobQueue;

/// Periodically drops old succeeded jobs from `queue`, on the given cron schedule.
pub fn spawn_expiry_sweeper<P>(
    queue: Arc<JobQueue<P>>,
    expression: &str,
    retention: Duration,
) -> Result<JoinHandle<()>, cron::error::Error>
where
    P: Clone + Debug + Send + Sync + 'static,
{
    let schedule = Schedule::from_str(expression)?;
    info!("Job expiry sweeper scheduled: {}", expression);

    Ok(tokio::spawn(async move {
        for next in schedule.upcoming(Utc) {
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            let expired = queue.expire_finished(retention).await;
            if expired > 0 {
                info!("Expired {} finished jobs", expired);
            } else {
                debug!("No finished jobs to expire");
            }
        }
        warn!("Job expiry schedule has no further occurrences");
    }))
}
