//! In-memory schedule grid and the wizard that fills it one cell at a time.
//!
//! The grid is a fixed `days x slots` layout with one slot reserved for the
//! lunch break. Entries are either a single-slot lecture or a two-slot
//! practical whose halves carry the same group payload. A [`CellEditor`]
//! collects the inputs step by step and writes nothing until the last step
//! has passed validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parallel lab batches a split practical fans out to.
pub const SUB_GROUPS: [&str; 3] = ["B1", "B2", "B3"];
pub const ALL_GROUPS: &str = "All";

const LECTURE_PALETTE: [&str; 6] = [
    "bg-blue-100 border-blue-300 text-blue-800",
    "bg-green-100 border-green-300 text-green-800",
    "bg-yellow-100 border-yellow-300 text-yellow-800",
    "bg-pink-100 border-pink-300 text-pink-800",
    "bg-indigo-100 border-indigo-300 text-indigo-800",
    "bg-teal-100 border-teal-300 text-teal-800",
];

const PRACTICAL_PALETTE: [&str; 4] = [
    "bg-purple-100 border-purple-300 text-purple-800",
    "bg-orange-100 border-orange-300 text-orange-800",
    "bg-red-100 border-red-300 text-red-800",
    "bg-cyan-100 border-cyan-300 text-cyan-800",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Lecture,
    Practical,
}

impl EntryKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lecture" => Some(Self::Lecture),
            "practical" => Some(Self::Practical),
            _ => None,
        }
    }
}

/// Style class for a subject: code-point sum modulo the palette of `kind`.
/// Distinct subjects may share a class.
pub fn color_for(subject: &str, kind: EntryKind) -> &'static str {
    let palette: &[&'static str] = match kind {
        EntryKind::Lecture => &LECTURE_PALETTE,
        EntryKind::Practical => &PRACTICAL_PALETTE,
    };
    let sum: u64 = subject.chars().map(|c| c as u64).sum();
    palette[(sum % palette.len() as u64) as usize]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub days: Vec<String>,
    pub slots: Vec<String>,
    pub lunch_slot: usize,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            days: ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            slots: [
                "9:00 AM", "10:00 AM", "11:00 AM", "12:00 PM", "1:00 PM", "2:00 PM", "3:00 PM",
                "4:00 PM",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            lunch_slot: 3,
        }
    }
}

impl GridLayout {
    pub fn validate(&self) -> Result<(), String> {
        check_labels(&self.days, "days")?;
        check_labels(&self.slots, "slots")?;
        if self.lunch_slot >= self.slots.len() {
            return Err(format!(
                "lunchSlot must be in 0..{}",
                self.slots.len()
            ));
        }
        Ok(())
    }

    pub fn day_index(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.days.iter().position(|d| d.eq_ignore_ascii_case(label))
    }

    pub fn slot_index(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.slots.iter().position(|s| s.eq_ignore_ascii_case(label))
    }

    pub fn is_lunch(&self, slot: usize) -> bool {
        slot == self.lunch_slot
    }
}

fn check_labels(labels: &[String], key: &str) -> Result<(), String> {
    if labels.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    for (i, label) in labels.iter().enumerate() {
        if label.trim().is_empty() {
            return Err(format!("{} must not contain blank labels", key));
        }
        if labels[..i].iter().any(|l| l.eq_ignore_ascii_case(label)) {
            return Err(format!("{} contains duplicate label {:?}", key, label));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonDetails {
    pub subject: String,
    pub faculty: String,
    pub room: String,
}

impl LessonDetails {
    pub fn new(subject: &str, faculty: &str, room: &str) -> Result<Self, ScheduleError> {
        let field = |v: &str, label: &str| {
            let v = v.trim();
            if v.is_empty() {
                Err(ScheduleError::Validation(format!("{} is required", label)))
            } else {
                Ok(v.to_string())
            }
        };
        Ok(Self {
            subject: field(subject, "subject")?,
            faculty: field(faculty, "faculty")?,
            room: field(room, "room")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchLesson {
    pub group: String,
    #[serde(flatten)]
    pub details: LessonDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PracticalGroups {
    All(LessonDetails),
    Split { batches: Vec<BatchLesson> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    First,
    Second,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScheduleEntry {
    Lecture(LessonDetails),
    Practical { half: Half, groups: PracticalGroups },
}

impl ScheduleEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Lecture(_) => EntryKind::Lecture,
            Self::Practical { .. } => EntryKind::Practical,
        }
    }

    /// Subject used for colouring; a split practical is coloured by its
    /// first batch.
    pub fn subject(&self) -> &str {
        match self {
            Self::Lecture(d) => &d.subject,
            Self::Practical {
                groups: PracticalGroups::All(d),
                ..
            } => &d.subject,
            Self::Practical {
                groups: PracticalGroups::Split { batches },
                ..
            } => batches
                .first()
                .map(|b| b.details.subject.as_str())
                .unwrap_or(""),
        }
    }

    pub fn color(&self) -> &'static str {
        color_for(self.subject(), self.kind())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellKey {
    pub day: usize,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    UnknownCell { day: usize, slot: usize },
    LunchBreak,
    Validation(String),
    Conflict(Vec<CellKey>),
    WrongStep { expected: WizardStep },
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCell { .. } | Self::Validation(_) => "validation_error",
            Self::LunchBreak => "lunch_break",
            Self::Conflict(_) => "conflict",
            Self::WrongStep { .. } => "wrong_step",
        }
    }

    /// Errors after which the open wizard is discarded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCell { day, slot } => {
                write!(f, "no cell at day {} slot {}", day, slot)
            }
            Self::LunchBreak => f.write_str("The lunch break cannot hold a lesson"),
            Self::Validation(msg) => f.write_str(msg),
            Self::Conflict(_) => f.write_str("The selected slot is already occupied"),
            Self::WrongStep { expected } => {
                write!(f, "the editor is waiting for {:?} input", expected)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    layout: GridLayout,
    cells: BTreeMap<CellKey, ScheduleEntry>,
}

impl Schedule {
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            cells: BTreeMap::new(),
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, day: usize, slot: usize) -> Option<&ScheduleEntry> {
        self.cells.get(&CellKey { day, slot })
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellKey, &ScheduleEntry)> {
        self.cells.iter()
    }

    fn check_cell(&self, day: usize, slot: usize) -> Result<(), ScheduleError> {
        if day >= self.layout.days.len() || slot >= self.layout.slots.len() {
            return Err(ScheduleError::UnknownCell { day, slot });
        }
        Ok(())
    }

    fn check_practical_start(&self, start: usize) -> Result<(), ScheduleError> {
        let last_start = self.layout.slots.len().saturating_sub(1);
        if start >= last_start {
            return Err(ScheduleError::Validation(format!(
                "practical start slot must be in 0..{}",
                last_start
            )));
        }
        if start.abs_diff(self.layout.lunch_slot) <= 1 {
            return Err(ScheduleError::Validation(
                "A practical cannot start next to the lunch break".to_string(),
            ));
        }
        Ok(())
    }

    fn occupied(&self, keys: &[CellKey]) -> Vec<CellKey> {
        keys.iter()
            .copied()
            .filter(|k| self.cells.contains_key(k))
            .collect()
    }

    fn commit_lecture(
        &mut self,
        key: CellKey,
        details: LessonDetails,
    ) -> Result<Vec<CellKey>, ScheduleError> {
        self.check_cell(key.day, key.slot)?;
        if self.layout.is_lunch(key.slot) {
            return Err(ScheduleError::LunchBreak);
        }
        if let Some(ScheduleEntry::Practical { .. }) = self.cells.get(&key) {
            return Err(ScheduleError::Conflict(vec![key]));
        }
        self.cells.insert(key, ScheduleEntry::Lecture(details));
        Ok(vec![key])
    }

    fn commit_practical(
        &mut self,
        day: usize,
        start: usize,
        groups: PracticalGroups,
    ) -> Result<Vec<CellKey>, ScheduleError> {
        self.check_cell(day, start)?;
        self.check_practical_start(start)?;
        let pair = [
            CellKey { day, slot: start },
            CellKey {
                day,
                slot: start + 1,
            },
        ];
        let taken = self.occupied(&pair);
        if !taken.is_empty() {
            return Err(ScheduleError::Conflict(taken));
        }
        self.cells.insert(
            pair[0],
            ScheduleEntry::Practical {
                half: Half::First,
                groups: groups.clone(),
            },
        );
        self.cells.insert(
            pair[1],
            ScheduleEntry::Practical {
                half: Half::Second,
                groups,
            },
        );
        Ok(pair.to_vec())
    }

    /// Removes the entry at a cell. Clearing either half of a practical
    /// clears both.
    pub fn clear(&mut self, day: usize, slot: usize) -> Result<Vec<CellKey>, ScheduleError> {
        self.check_cell(day, slot)?;
        let key = CellKey { day, slot };
        let partner = match self.cells.get(&key) {
            None => return Ok(Vec::new()),
            Some(ScheduleEntry::Lecture(_)) => None,
            Some(ScheduleEntry::Practical {
                half: Half::First, ..
            }) => Some(CellKey {
                day,
                slot: slot + 1,
            }),
            Some(ScheduleEntry::Practical {
                half: Half::Second,
                ..
            }) => slot.checked_sub(1).map(|s| CellKey { day, slot: s }),
        };
        let mut removed = vec![key];
        self.cells.remove(&key);
        if let Some(p) = partner {
            if self.cells.remove(&p).is_some() {
                removed.push(p);
            }
        }
        removed.sort();
        Ok(removed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    Kind,
    LectureDetails,
    PracticalStart,
    PracticalSplit,
    PracticalDetails,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardInput {
    Kind(EntryKind),
    Details(LessonDetails),
    Start(usize),
    Split(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Next(WizardStep),
    Committed(Vec<CellKey>),
}

/// Step-by-step editor for one activated cell.
#[derive(Debug, Clone)]
pub struct CellEditor {
    day: usize,
    slot: usize,
    step: WizardStep,
    start: Option<usize>,
    split: bool,
    batches: Vec<LessonDetails>,
}

impl CellEditor {
    pub fn open(schedule: &Schedule, day: usize, slot: usize) -> Result<Self, ScheduleError> {
        schedule.check_cell(day, slot)?;
        if schedule.layout.is_lunch(slot) {
            return Err(ScheduleError::LunchBreak);
        }
        Ok(Self {
            day,
            slot,
            step: WizardStep::Kind,
            start: None,
            split: false,
            batches: Vec::new(),
        })
    }

    pub fn day(&self) -> usize {
        self.day
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn start(&self) -> Option<usize> {
        self.start
    }

    /// Group whose details the next `Details` input belongs to.
    pub fn pending_group(&self) -> Option<&'static str> {
        if self.step != WizardStep::PracticalDetails {
            return None;
        }
        if self.split {
            SUB_GROUPS.get(self.batches.len()).copied()
        } else {
            Some(ALL_GROUPS)
        }
    }

    pub fn submit(
        &mut self,
        schedule: &mut Schedule,
        input: WizardInput,
    ) -> Result<Progress, ScheduleError> {
        let result = self.advance(schedule, input);
        match &result {
            Ok(Progress::Committed(_)) => self.step = WizardStep::Done,
            Err(e) if e.is_terminal() => self.step = WizardStep::Done,
            _ => {}
        }
        result
    }

    fn advance(
        &mut self,
        schedule: &mut Schedule,
        input: WizardInput,
    ) -> Result<Progress, ScheduleError> {
        match (self.step, input) {
            (WizardStep::Kind, WizardInput::Kind(EntryKind::Lecture)) => {
                self.step = WizardStep::LectureDetails;
                Ok(Progress::Next(self.step))
            }
            (WizardStep::Kind, WizardInput::Kind(EntryKind::Practical)) => {
                self.step = WizardStep::PracticalStart;
                Ok(Progress::Next(self.step))
            }
            (WizardStep::LectureDetails, WizardInput::Details(details)) => schedule
                .commit_lecture(
                    CellKey {
                        day: self.day,
                        slot: self.slot,
                    },
                    details,
                )
                .map(Progress::Committed),
            (WizardStep::PracticalStart, WizardInput::Start(start)) => {
                schedule.check_practical_start(start)?;
                let pair = [
                    CellKey {
                        day: self.day,
                        slot: start,
                    },
                    CellKey {
                        day: self.day,
                        slot: start + 1,
                    },
                ];
                let taken = schedule.occupied(&pair);
                if !taken.is_empty() {
                    return Err(ScheduleError::Conflict(taken));
                }
                self.start = Some(start);
                self.step = WizardStep::PracticalSplit;
                Ok(Progress::Next(self.step))
            }
            (WizardStep::PracticalSplit, WizardInput::Split(split)) => {
                self.split = split;
                self.step = WizardStep::PracticalDetails;
                Ok(Progress::Next(self.step))
            }
            (WizardStep::PracticalDetails, WizardInput::Details(details)) => {
                let needed = if self.split { SUB_GROUPS.len() } else { 1 };
                if self.batches.len() + 1 < needed {
                    self.batches.push(details);
                    return Ok(Progress::Next(self.step));
                }
                let start = self.start.ok_or(ScheduleError::WrongStep {
                    expected: WizardStep::PracticalStart,
                })?;
                let groups = if self.split {
                    let batches = SUB_GROUPS
                        .iter()
                        .zip(self.batches.iter().cloned().chain(std::iter::once(details)))
                        .map(|(group, details)| BatchLesson {
                            group: group.to_string(),
                            details,
                        })
                        .collect();
                    PracticalGroups::Split { batches }
                } else {
                    PracticalGroups::All(details)
                };
                schedule
                    .commit_practical(self.day, start, groups)
                    .map(Progress::Committed)
            }
            (step, _) => Err(ScheduleError::WrongStep { expected: step }),
        }
    }
}
