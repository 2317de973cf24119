//! Default daily tasks seeded on wake-up

use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Weekday};
use log::{debug, warn};

use super::models::{Task, TaskSpec, TaskType};
use super::queue::TaskScheduler;

const DAY_SECS: u64 = 86_400;
const REFLECTION_HOURS: [u32; 4] = [10, 14, 18, 22];

/// Today's local datetime at `hour:minute`, if that time exists today
pub fn today_at(now: DateTime<Local>, hour: u32, minute: u32) -> Option<DateTime<Local>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Local
        .from_local_datetime(&now.date_naive().and_time(time))
        .earliest()
}

/// Specs for today's default tasks whose slot is still ahead of `now`
pub fn daily_task_specs(now: DateTime<Local>) -> Vec<TaskSpec> {
    let mut specs = Vec::new();

    // Only the next reflection slot; it recurs daily from there
    if let Some((hour, at)) = REFLECTION_HOURS
        .iter()
        .filter_map(|hour| today_at(now, *hour, 0).map(|at| (*hour, at)))
        .find(|(_, at)| *at > now)
    {
        specs.push(
            TaskSpec::new(TaskType::SelfReflection, &format!("Self Reflection ({}:00)", hour))
                .with_description("Think about what I know, what I need to learn, and plan my next tasks")
                .with_priority(8)
                .scheduled_at(at)
                .recurring_every(DAY_SECS),
        );
    }

    if let Some(at) = today_at(now, 9, 30).filter(|at| *at > now) {
        specs.push(
            TaskSpec::new(TaskType::LearnFromHistory, "Morning Review")
                .with_description("Review yesterday's activities and update the profile with new insights")
                .with_priority(7)
                .scheduled_at(at)
                .recurring_every(DAY_SECS),
        );
    }

    if let Some(at) = today_at(now, 20, 30).filter(|at| *at > now) {
        specs.push(
            TaskSpec::new(TaskType::SummarizePeriod, "Daily Summary")
                .with_description("Summarize today's activities and update relevant profile files")
                .with_priority(7)
                .scheduled_at(at)
                .recurring_every(DAY_SECS),
        );
    }

    if now.weekday() == Weekday::Sun {
        if let Some(at) = today_at(now, 21, 0).filter(|at| *at > now) {
            specs.push(
                TaskSpec::new(TaskType::DiscoverPatterns, "Weekly Pattern Analysis")
                    .with_description("Analyze this week's activities and discover behavioral patterns")
                    .with_priority(6)
                    .scheduled_at(at),
            );
        }
    }

    specs
}

/// Seed today's default tasks unless something is already scheduled today
pub fn ensure_daily_tasks(scheduler: &mut TaskScheduler, now: DateTime<Local>) -> Vec<Task> {
    if scheduler.has_task_scheduled_on(now.date_naive()) {
        debug!("Daily tasks already scheduled for {}", now.date_naive());
        return Vec::new();
    }

    daily_task_specs(now)
        .into_iter()
        .filter_map(|spec| {
            let title = spec.title.clone();
            match scheduler.create_task(spec, now) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!("Skipping daily task '{}': {}", title, e);
                    None
                }
            }
        })
        .collect()
}
