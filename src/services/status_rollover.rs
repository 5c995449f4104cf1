use serde_json::{Map, Value};
use time::{OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::db::models::{Explanation, ScheduleRow};
use crate::db::types::ExplanationStatus;
use crate::repositories::{classrooms, explanations, paths};
use crate::services::{schedule_versions, ServiceResult};
use crate::store::{DocumentStore, WriteBatch, MAX_BATCH_WRITES};

/// Separator between start and end in schedule time ranges such as `13:45–15:00`.
const TIME_RANGE_SEPARATOR: char = '–';

/// End of `session` according to `rows`. Rows with a missing session, no en-dash range or an
/// end that is not `H:MM` yield `None`.
pub(crate) fn session_end_time(session: &str, rows: &[ScheduleRow]) -> Option<Time> {
    let row = rows.iter().find(|row| row.session == session)?;
    let (_, end) = row.time.split_once(TIME_RANGE_SEPARATOR)?;
    let (hours, minutes) = end.trim().split_once(':')?;
    let hours: u8 = hours.trim().parse().ok()?;
    let minutes: u8 = minutes.trim().parse().ok()?;
    Time::from_hms(hours, minutes, 0).ok()
}

/// The instant the explanation's session ends, taken on the explanation's calendar day in the
/// school's local offset.
pub(crate) fn session_end_instant(
    explanation: &Explanation,
    rows: &[ScheduleRow],
    offset: UtcOffset,
) -> Option<OffsetDateTime> {
    let end = session_end_time(&explanation.session, rows)?;
    let local_date = explanation.explanation_date.to_offset(offset).date();
    Some(PrimitiveDateTime::new(local_date, end).assume_offset(offset))
}

pub(crate) fn has_elapsed(
    explanation: &Explanation,
    rows: &[ScheduleRow],
    offset: UtcOffset,
    now: OffsetDateTime,
) -> bool {
    explanation.status == ExplanationStatus::Upcoming
        && session_end_instant(explanation, rows, offset).is_some_and(|end| now >= end)
}

/// Marks every elapsed `Upcoming` explanation of the classroom as `Finished`. Returns how many
/// changed. Without an active schedule nothing can be resolved and nothing is written.
pub(crate) async fn finish_elapsed(
    store: &dyn DocumentStore,
    classroom_id: &str,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> ServiceResult<usize> {
    let Some(rows) = schedule_versions::active_rows(store, classroom_id).await? else {
        return Ok(0);
    };

    let upcoming =
        explanations::list_with_status(store, classroom_id, ExplanationStatus::Upcoming).await?;
    let elapsed: Vec<&Explanation> = upcoming
        .iter()
        .filter(|explanation| has_elapsed(explanation, &rows, offset, now))
        .collect();

    if elapsed.is_empty() {
        return Ok(0);
    }

    for chunk in elapsed.chunks(MAX_BATCH_WRITES) {
        let mut batch = WriteBatch::new();
        for explanation in chunk {
            let mut fields = Map::new();
            fields.insert(
                "status".to_string(),
                Value::String(ExplanationStatus::Finished.as_str().to_string()),
            );
            batch.update(paths::explanation(classroom_id, &explanation.id)?, fields);
        }
        store.commit(batch).await?;
    }

    metrics::counter!("explanations_finished_total").increment(elapsed.len() as u64);
    tracing::info!(classroom_id, finished = elapsed.len(), "Explanations rolled over to Finished");
    Ok(elapsed.len())
}

/// Runs [`finish_elapsed`] over every classroom. A failing classroom is logged and skipped.
pub(crate) async fn finish_elapsed_everywhere(
    store: &dyn DocumentStore,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> ServiceResult<usize> {
    let mut total = 0;
    for classroom_id in classrooms::list_ids(store).await? {
        match finish_elapsed(store, &classroom_id, offset, now).await {
            Ok(finished) => total += finished,
            Err(err) => {
                tracing::warn!(classroom_id = %classroom_id, error = %err, "Rollover pass failed");
            }
        }
    }
    Ok(total)
}
