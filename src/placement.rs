use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Task, TaskPatch};
use crate::time_grid::{time_to_minutes, TimeGrid, TimeSlot};

/// Tasks of one day grouped for the timeline.
///
/// Tasks that have no start time, whose start time does not parse, or whose
/// start time falls outside the grid all land in `unscheduled`, in store order.
#[derive(Debug, Default)]
pub struct Placement<'a> {
    pub unscheduled: Vec<&'a Task>,
    pub slots: BTreeMap<usize, Vec<&'a Task>>,
}

impl<'a> Placement<'a> {
    pub fn tasks_in_slot(&self, index: usize) -> &[&'a Task] {
        self.slots.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn placed_count(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }
}

/// Slot index of `start_time` on `grid`, or `None` when it is off the grid.
pub fn slot_index_for(grid: &TimeGrid, start_time: &str) -> Option<usize> {
    let minutes = i64::from(time_to_minutes(start_time).ok()?);
    let offset = minutes - i64::from(grid.start_minutes());
    let index = offset.div_euclid(i64::from(grid.interval_minutes()));
    if index < 0 || index >= grid.len() as i64 {
        return None;
    }
    Some(index as usize)
}

pub fn place_tasks<'a>(grid: &TimeGrid, tasks: &'a [Task]) -> Placement<'a> {
    let mut placement = Placement::default();
    for task in tasks {
        let Some(start_time) = task.start_time() else {
            placement.unscheduled.push(task);
            continue;
        };
        match slot_index_for(grid, start_time) {
            Some(index) => placement.slots.entry(index).or_default().push(task),
            None => {
                log::debug!(
                    "placement: task_id={} start_time={start_time} is off the grid",
                    task.id
                );
                placement.unscheduled.push(task);
            }
        }
    }
    placement
}

/// Patch produced when a task is dropped on slot `index`.
pub fn drop_on_slot(grid: &TimeGrid, index: usize) -> Option<TaskPatch> {
    let slot = grid.slot(index)?;
    Some(TaskPatch {
        start_time: Some(Some(slot.value.clone())),
        ..TaskPatch::default()
    })
}

pub fn toggle_completion(task: &Task) -> TaskPatch {
    TaskPatch {
        completed: Some(!task.completed),
        ..TaskPatch::default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRow {
    pub slot: TimeSlot,
    pub tasks: Vec<Task>,
}

/// Owned timeline view model: every grid slot in order, plus the unscheduled tray.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub unscheduled: Vec<Task>,
    pub rows: Vec<SlotRow>,
}

impl Timeline {
    pub fn build(grid: &TimeGrid, tasks: &[Task]) -> Self {
        let placement = place_tasks(grid, tasks);
        let rows = grid
            .slots()
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotRow {
                slot: slot.clone(),
                tasks: placement
                    .tasks_in_slot(index)
                    .iter()
                    .map(|task| (*task).clone())
                    .collect(),
            })
            .collect();
        Self {
            unscheduled: placement.unscheduled.into_iter().cloned().collect(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskDraft;

    fn grid() -> TimeGrid {
        TimeGrid::new(6, 22, 30).unwrap()
    }

    fn task(id: u64, start: Option<&str>) -> Task {
        let mut draft = TaskDraft::new(format!("task-{id}"), "2026-10-16");
        draft.start_time = start.map(str::to_string);
        draft.into_task(id, None)
    }

    fn ids(tasks: &[&Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn tasks_inside_one_interval_share_a_slot() {
        let tasks = vec![task(1, Some("06:00")), task(2, Some("06:20"))];
        let placement = place_tasks(&grid(), &tasks);
        assert_eq!(ids(placement.tasks_in_slot(0)), vec![1, 2]);
        assert!(placement.unscheduled.is_empty());
    }

    #[test]
    fn slot_boundaries_are_half_open() {
        let g = grid();
        assert_eq!(slot_index_for(&g, "06:29"), Some(0));
        assert_eq!(slot_index_for(&g, "06:30"), Some(1));
        assert_eq!(slot_index_for(&g, "21:59"), Some(31));
        assert_eq!(slot_index_for(&g, "22:00"), None);
        assert_eq!(slot_index_for(&g, "05:59"), None);
    }

    #[test]
    fn order_within_slot_is_store_order_not_minute_order() {
        let tasks = vec![task(1, Some("07:25")), task(2, Some("07:00"))];
        let placement = place_tasks(&grid(), &tasks);
        assert_eq!(ids(placement.tasks_in_slot(2)), vec![1, 2]);
    }

    #[test]
    fn off_grid_and_unparseable_times_fall_back_to_unscheduled() {
        let tasks = vec![
            task(1, None),
            task(2, Some("05:30")),
            task(3, Some("09:10")),
            task(4, Some("22:15")),
            task(5, Some("9am")),
            task(6, Some("")),
        ];
        let placement = place_tasks(&grid(), &tasks);
        assert_eq!(ids(&placement.unscheduled), vec![1, 2, 4, 5, 6]);
        assert_eq!(ids(placement.tasks_in_slot(6)), vec![3]);
        assert_eq!(placement.placed_count(), 1);
        // The stored start time is left untouched.
        assert_eq!(placement.unscheduled[1].start_time(), Some("05:30"));
    }

    #[test]
    fn placement_is_deterministic() {
        let tasks = vec![task(1, Some("08:00")), task(2, None), task(3, Some("08:45"))];
        let g = grid();
        let first = place_tasks(&g, &tasks);
        let second = place_tasks(&g, &tasks);
        assert_eq!(first.slots, second.slots);
        assert_eq!(first.unscheduled, second.unscheduled);
    }

    #[test]
    fn empty_grid_leaves_everything_unscheduled() {
        let g = TimeGrid::new(10, 10, 30).unwrap();
        let tasks = vec![task(1, Some("10:00"))];
        let placement = place_tasks(&g, &tasks);
        assert_eq!(ids(&placement.unscheduled), vec![1]);
    }

    #[test]
    fn drop_on_slot_sets_the_slot_value() {
        let g = grid();
        let patch = drop_on_slot(&g, 3).unwrap();
        assert_eq!(patch.start_time, Some(Some("07:30".to_string())));
        assert!(drop_on_slot(&g, 32).is_none());

        let mut t = task(1, None);
        patch.apply(&mut t);
        assert_eq!(slot_index_for(&g, t.start_time().unwrap()), Some(3));
    }

    #[test]
    fn toggle_completion_flips_the_flag() {
        let mut t = task(1, None);
        toggle_completion(&t).apply(&mut t);
        assert!(t.completed);
        toggle_completion(&t).apply(&mut t);
        assert!(!t.completed);
    }

    #[test]
    fn timeline_lists_every_slot_with_its_tasks() {
        let tasks = vec![task(1, Some("06:10")), task(2, None), task(3, Some("21:45"))];
        let timeline = Timeline::build(&grid(), &tasks);
        assert_eq!(timeline.rows.len(), 32);
        assert_eq!(timeline.rows[0].tasks.len(), 1);
        assert_eq!(timeline.rows[31].tasks[0].id, 3);
        assert!(timeline.rows[15].tasks.is_empty());
        assert_eq!(timeline.unscheduled.len(), 1);
        assert_eq!(timeline.unscheduled[0].id, 2);
    }
}
