use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

pub const PERIODS_PER_DAY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    pub fn index(self) -> i64 {
        match self {
            Weekday::Monday => 0,
            Weekday::Tuesday => 1,
            Weekday::Wednesday => 2,
            Weekday::Thursday => 3,
            Weekday::Friday => 4,
        }
    }

    pub fn from_index(i: i64) -> Option<Self> {
        usize::try_from(i).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
        }
    }
}

/// Number of cells in one class's weekly grid.
pub fn slots_per_week() -> usize {
    Weekday::ALL.len() * PERIODS_PER_DAY as usize
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSection {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignment {
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub day: Weekday,
    pub period: u8,
    pub subject_id: Option<String>,
    pub teacher_id: Option<String>,
}

impl TimeSlot {
    fn free(day: Weekday, period: u8) -> Self {
        Self {
            day,
            period,
            subject_id: None,
            teacher_id: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.teacher_id.is_none()
    }
}

/// Slot as seen from a teacher's side of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSlot {
    pub class_id: String,
    pub day: Weekday,
    pub period: u8,
    pub subject_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    #[error("insufficient data to generate timetable: {what} unavailable ({reason})")]
    DataUnavailable { what: &'static str, reason: String },
}

impl TimetableError {
    pub fn unavailable(what: &'static str, reason: impl Into<String>) -> Self {
        TimetableError::DataUnavailable {
            what,
            reason: reason.into(),
        }
    }
}

/// Per-teacher record of the (day, period) cells already claimed in a run.
#[derive(Debug, Default)]
pub struct TeacherOccupancy {
    claimed: HashMap<String, HashSet<(Weekday, u8)>>,
}

impl TeacherOccupancy {
    pub fn is_free(&self, teacher_id: &str, day: Weekday, period: u8) -> bool {
        self.claimed
            .get(teacher_id)
            .map(|cells| !cells.contains(&(day, period)))
            .unwrap_or(true)
    }

    /// Returns false if the teacher already held this cell.
    pub fn claim(&mut self, teacher_id: &str, day: Weekday, period: u8) -> bool {
        self.claimed
            .entry(teacher_id.to_string())
            .or_default()
            .insert((day, period))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimetableInputs {
    pub classes: Vec<ClassSection>,
    pub subjects: Vec<Subject>,
    pub assignments: Vec<TeacherAssignment>,
}

impl TimetableInputs {
    /// Any missing collection means the surrounding fetch failed; no partial run is attempted.
    pub fn from_parts(
        classes: Option<Vec<ClassSection>>,
        subjects: Option<Vec<Subject>>,
        assignments: Option<Vec<TeacherAssignment>>,
    ) -> Result<Self, TimetableError> {
        let classes =
            classes.ok_or_else(|| TimetableError::unavailable("classes", "not supplied"))?;
        let subjects =
            subjects.ok_or_else(|| TimetableError::unavailable("subjects", "not supplied"))?;
        let assignments = assignments
            .ok_or_else(|| TimetableError::unavailable("assignments", "not supplied"))?;
        Ok(Self {
            classes,
            subjects,
            assignments,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSchedule {
    pub class_id: String,
    pub slots: Vec<TimeSlot>,
}

/// Generated weekly grids, one per class, in the order the classes were processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timetable {
    pub classes: Vec<ClassSchedule>,
}

impl Timetable {
    #[cfg(test)]
    pub fn slots_for(&self, class_id: &str) -> Option<&[TimeSlot]> {
        self.classes
            .iter()
            .find(|c| c.class_id == class_id)
            .map(|c| c.slots.as_slice())
    }

    pub fn teacher_view(&self, teacher_id: &str) -> Vec<TeacherSlot> {
        let mut out: Vec<TeacherSlot> = self
            .classes
            .iter()
            .flat_map(|c| {
                c.slots.iter().filter_map(move |s| {
                    if s.teacher_id.as_deref() != Some(teacher_id) {
                        return None;
                    }
                    Some(TeacherSlot {
                        class_id: c.class_id.clone(),
                        day: s.day,
                        period: s.period,
                        subject_id: s.subject_id.clone().unwrap_or_default(),
                    })
                })
            })
            .collect();
        out.sort_by_key(|s| (s.day, s.period));
        out
    }

    pub fn free_period_count(&self) -> usize {
        self.classes
            .iter()
            .flat_map(|c| c.slots.iter())
            .filter(|s| s.is_free())
            .count()
    }
}

/// State owned by one generation call. Occupancy is shared across classes
/// within the run, so class order affects the result.
struct GenerationRun<'a> {
    occupancy: TeacherOccupancy,
    assignments: &'a [TeacherAssignment],
}

impl<'a> GenerationRun<'a> {
    fn new(assignments: &'a [TeacherAssignment]) -> Self {
        Self {
            occupancy: TeacherOccupancy::default(),
            assignments,
        }
    }

    fn schedule_class(&mut self, class_id: &str) -> Vec<TimeSlot> {
        let mut queue: VecDeque<&TeacherAssignment> = self
            .assignments
            .iter()
            .filter(|a| a.class_id == class_id)
            .collect();

        let mut slots = Vec::with_capacity(slots_per_week());
        for day in Weekday::ALL {
            for period in 1..=PERIODS_PER_DAY {
                let picked = queue.iter().position(|a| {
                    a.teacher_id
                        .as_deref()
                        .is_some_and(|t| self.occupancy.is_free(t, day, period))
                });
                let Some(assignment) = picked.and_then(|i| queue.remove(i)) else {
                    slots.push(TimeSlot::free(day, period));
                    continue;
                };
                // position() only matches assignments carrying a teacher.
                let teacher_id = assignment.teacher_id.clone().unwrap_or_default();
                self.occupancy.claim(&teacher_id, day, period);
                slots.push(TimeSlot {
                    day,
                    period,
                    subject_id: Some(assignment.subject_id.clone()),
                    teacher_id: Some(teacher_id),
                });
                queue.push_back(assignment);
            }
        }
        slots
    }
}

/// Greedy single pass over classes in input order. Never backtracks.
pub fn generate(inputs: &TimetableInputs) -> Timetable {
    let mut run = GenerationRun::new(&inputs.assignments);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut classes = Vec::with_capacity(inputs.classes.len());
    for class in &inputs.classes {
        // A repeated class id would otherwise get a second grid under the same key.
        if !seen.insert(class.id.as_str()) {
            continue;
        }
        classes.push(ClassSchedule {
            class_id: class.id.clone(),
            slots: run.schedule_class(&class.id),
        });
    }
    Timetable { classes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: &str) -> ClassSection {
        ClassSection {
            id: id.to_string(),
            name: format!("Class {}", id),
        }
    }

    fn subject(id: &str) -> Subject {
        Subject {
            id: id.to_string(),
            name: id.to_string(),
        }
    }

    fn assign(class_id: &str, subject_id: &str, teacher_id: Option<&str>) -> TeacherAssignment {
        TeacherAssignment {
            class_id: class_id.to_string(),
            subject_id: subject_id.to_string(),
            teacher_id: teacher_id.map(|t| t.to_string()),
        }
    }

    fn inputs(
        classes: Vec<ClassSection>,
        assignments: Vec<TeacherAssignment>,
    ) -> TimetableInputs {
        TimetableInputs {
            classes,
            subjects: vec![subject("math"), subject("science"), subject("art")],
            assignments,
        }
    }

    #[test]
    fn every_class_gets_a_full_grid() {
        let tt = generate(&inputs(
            vec![class("x"), class("y"), class("z")],
            vec![
                assign("x", "math", Some("t1")),
                assign("x", "science", Some("t2")),
                assign("y", "math", Some("t1")),
            ],
        ));
        assert_eq!(tt.classes.len(), 3);
        for c in &tt.classes {
            assert_eq!(c.slots.len(), 25);
            let cells: HashSet<(Weekday, u8)> = c.slots.iter().map(|s| (s.day, s.period)).collect();
            assert_eq!(cells.len(), 25);
            for day in Weekday::ALL {
                for p in 1..=PERIODS_PER_DAY {
                    assert!(cells.contains(&(day, p)));
                }
            }
        }
        // Grid order is Monday period 1 through Friday period 5.
        let first = &tt.classes[0].slots;
        assert_eq!((first[0].day, first[0].period), (Weekday::Monday, 1));
        assert_eq!((first[24].day, first[24].period), (Weekday::Friday, 5));
    }

    #[test]
    fn no_teacher_is_double_booked_across_classes() {
        let tt = generate(&inputs(
            vec![class("a"), class("b"), class("c")],
            vec![
                assign("a", "math", Some("t1")),
                assign("a", "science", Some("t2")),
                assign("b", "math", Some("t1")),
                assign("b", "art", Some("t3")),
                assign("c", "science", Some("t2")),
                assign("c", "art", Some("t3")),
                assign("c", "math", Some("t1")),
            ],
        ));
        let mut seen: HashSet<(String, Weekday, u8)> = HashSet::new();
        for c in &tt.classes {
            for s in &c.slots {
                if let Some(t) = &s.teacher_id {
                    assert!(
                        seen.insert((t.clone(), s.day, s.period)),
                        "teacher {} double booked at {:?} {}",
                        t,
                        s.day,
                        s.period
                    );
                }
            }
        }
    }

    #[test]
    fn assignments_without_teacher_leave_every_slot_free() {
        let tt = generate(&inputs(
            vec![class("x")],
            vec![assign("x", "math", None), assign("x", "art", None)],
        ));
        let slots = tt.slots_for("x").expect("class x");
        assert_eq!(slots.len(), 25);
        assert!(slots
            .iter()
            .all(|s| s.subject_id.is_none() && s.teacher_id.is_none()));
        assert_eq!(tt.free_period_count(), 25);
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let inp = inputs(
            vec![class("x"), class("y")],
            vec![
                assign("x", "math", Some("t1")),
                assign("x", "science", Some("t2")),
                assign("y", "science", Some("t2")),
                assign("y", "art", Some("t3")),
            ],
        );
        let a = serde_json::to_string(&generate(&inp)).expect("serialize");
        let b = serde_json::to_string(&generate(&inp)).expect("serialize");
        assert_eq!(a, b);
    }

    #[test]
    fn selected_assignment_rotates_to_the_back() {
        let tt = generate(&inputs(
            vec![class("x")],
            vec![
                assign("x", "math", Some("t1")),
                assign("x", "science", Some("t2")),
            ],
        ));
        let slots = tt.slots_for("x").expect("class x");
        assert_eq!(slots[0].subject_id.as_deref(), Some("math"));
        assert_eq!(slots[0].teacher_id.as_deref(), Some("t1"));
        assert_eq!(slots[1].subject_id.as_deref(), Some("science"));
        assert_eq!(slots[1].teacher_id.as_deref(), Some("t2"));
        for (i, s) in slots.iter().enumerate() {
            let expected = if i % 2 == 0 { "math" } else { "science" };
            assert_eq!(s.subject_id.as_deref(), Some(expected), "slot {}", i);
        }
    }

    #[test]
    fn earlier_class_claims_shared_teacher_first() {
        let tt = generate(&inputs(
            vec![class("x"), class("y"), class("z")],
            vec![
                assign("x", "math", Some("t1")),
                assign("y", "math", Some("t1")),
                assign("y", "art", Some("t3")),
                assign("z", "math", Some("t1")),
            ],
        ));
        let x = tt.slots_for("x").expect("class x");
        assert!(x.iter().all(|s| s.teacher_id.as_deref() == Some("t1")));

        // t1 is busy every cell, so y falls through to its next assignment.
        let y = tt.slots_for("y").expect("class y");
        assert_eq!(y[0].teacher_id.as_deref(), Some("t3"));
        assert!(y.iter().all(|s| s.teacher_id.as_deref() == Some("t3")));

        // z has nothing else to offer.
        let z = tt.slots_for("z").expect("class z");
        assert!(z.iter().all(TimeSlot::is_free));
    }

    #[test]
    fn processing_order_changes_who_gets_the_teacher() {
        let assignments = vec![
            assign("x", "math", Some("t1")),
            assign("y", "math", Some("t1")),
        ];
        let xy = generate(&inputs(vec![class("x"), class("y")], assignments.clone()));
        let yx = generate(&inputs(vec![class("y"), class("x")], assignments));
        assert!(xy.slots_for("y").expect("y").iter().all(TimeSlot::is_free));
        assert!(yx.slots_for("x").expect("x").iter().all(TimeSlot::is_free));
    }

    #[test]
    fn class_without_assignments_is_all_free() {
        let tt = generate(&inputs(vec![class("empty")], vec![]));
        let slots = tt.slots_for("empty").expect("class");
        assert_eq!(slots.len(), 25);
        assert!(slots.iter().all(TimeSlot::is_free));
    }

    #[test]
    fn missing_collection_is_data_unavailable() {
        let res = TimetableInputs::from_parts(Some(vec![class("x")]), None, Some(vec![]));
        match res {
            Err(TimetableError::DataUnavailable { what, .. }) => assert_eq!(what, "subjects"),
            Ok(_) => panic!("expected DataUnavailable"),
        }
        assert!(TimetableInputs::from_parts(None, Some(vec![]), Some(vec![])).is_err());
        assert!(TimetableInputs::from_parts(Some(vec![]), Some(vec![]), None).is_err());
        let empty = TimetableInputs::from_parts(Some(vec![]), Some(vec![]), Some(vec![]))
            .expect("empty collections are valid");
        assert!(generate(&empty).classes.is_empty());
    }

    #[test]
    fn teacher_view_lists_cells_in_week_order() {
        let tt = generate(&inputs(
            vec![class("x"), class("y")],
            vec![
                assign("x", "math", Some("t1")),
                assign("x", "art", Some("t3")),
                assign("y", "math", Some("t1")),
                assign("y", "science", Some("t2")),
            ],
        ));
        let view = tt.teacher_view("t1");
        assert_eq!(view.len(), 25);
        assert_eq!(view[0].class_id, "x");
        assert_eq!((view[0].day, view[0].period), (Weekday::Monday, 1));
        assert_eq!(view[1].class_id, "y");
        assert_eq!((view[1].day, view[1].period), (Weekday::Monday, 2));
        for w in view.windows(2) {
            assert!((w[0].day, w[0].period) < (w[1].day, w[1].period));
        }
    }

    #[test]
    fn repeated_class_id_is_scheduled_once() {
        let tt = generate(&inputs(
            vec![class("x"), class("x")],
            vec![assign("x", "math", Some("t1"))],
        ));
        assert_eq!(tt.classes.len(), 1);
        assert_eq!(tt.slots_for("x").map(|s| s.len()), Some(25));
    }

    #[test]
    fn occupancy_claim_reports_conflicts() {
        let mut occ = TeacherOccupancy::default();
        assert!(occ.is_free("t1", Weekday::Monday, 1));
        assert!(occ.claim("t1", Weekday::Monday, 1));
        assert!(!occ.is_free("t1", Weekday::Monday, 1));
        assert!(occ.is_free("t1", Weekday::Monday, 2));
        assert!(occ.is_free("t2", Weekday::Monday, 1));
        assert!(!occ.claim("t1", Weekday::Monday, 1));
    }

    #[test]
    fn weekday_index_round_trips() {
        for d in Weekday::ALL {
            assert_eq!(Weekday::from_index(d.index()), Some(d));
        }
        assert_eq!(Weekday::from_index(5), None);
        assert_eq!(Weekday::from_index(-1), None);
    }
}
