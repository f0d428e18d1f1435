//! Static marathon catalog
//!
//! Process-wide read-only state: every marathon the bot offers, with its
//! 30-day task list. Initialized once at startup and never mutated.

use once_cell::sync::Lazy;
use std::sync::Arc;
use thiserror::Error;

/// Length of every marathon, in days.
pub const MARATHON_DAYS: u32 = 30;

/// Shown when a stored enrollment points at a task the catalog cannot
/// resolve (stale key after a catalog change). Keeps the user's flow alive
/// instead of erroring out.
pub const PLACEHOLDER_TASK: &str =
    "Today's task is temporarily unavailable. Do one small thing for your habit anyway!";

/// Lookup miss: unknown marathon key or day outside [1, 30].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no task at that marathon/day position")]
pub struct OutOfRange;

/// One marathon program: metadata plus its ordered task list.
#[derive(Debug, Clone)]
pub struct MarathonSpec {
    /// Stable key used in storage and callback data.
    pub key: String,
    /// Human-readable name.
    pub title: String,
    /// One-line pitch shown in the chooser.
    pub description: String,
    /// Premium programs are listed but cannot be enrolled in yet.
    pub premium: bool,
    /// Exactly [`MARATHON_DAYS`] entries for free programs.
    pub tasks: Vec<String>,
}

/// Immutable collection of marathon programs.
#[derive(Debug, Clone)]
pub struct Catalog {
    programs: Vec<MarathonSpec>,
}

impl Catalog {
    pub fn new(programs: Vec<MarathonSpec>) -> Self {
        Self { programs }
    }

    /// The catalog shipped with the bot.
    pub fn builtin() -> Self {
        Self::new(vec![
            MarathonSpec {
                key: "reading".to_string(),
                title: "Reading".to_string(),
                description: "30 days of building a reading habit".to_string(),
                premium: false,
                tasks: reading_tasks(),
            },
            MarathonSpec {
                key: "fitness".to_string(),
                title: "Fitness".to_string(),
                description: "30 days of daily movement".to_string(),
                premium: false,
                tasks: fitness_tasks(),
            },
            MarathonSpec {
                key: "meditation".to_string(),
                title: "Meditation".to_string(),
                description: "30 days of mindfulness".to_string(),
                premium: true,
                tasks: Vec::new(),
            },
            MarathonSpec {
                key: "finance".to_string(),
                title: "Finance".to_string(),
                description: "30 days of money literacy".to_string(),
                premium: true,
                tasks: Vec::new(),
            },
        ])
    }

    pub fn get(&self, key: &str) -> Option<&MarathonSpec> {
        self.programs.iter().find(|p| p.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All programs, in listing order.
    pub fn list(&self) -> &[MarathonSpec] {
        &self.programs
    }

    /// Task text for `day` (1-based) of the given marathon.
    pub fn task_at(&self, key: &str, day: u32) -> Result<&str, OutOfRange> {
        if day < 1 || day > MARATHON_DAYS {
            return Err(OutOfRange);
        }
        self.get(key)
            .and_then(|p| p.tasks.get(day as usize - 1))
            .map(|s| s.as_str())
            .ok_or(OutOfRange)
    }
}

static BUILTIN: Lazy<Arc<Catalog>> = Lazy::new(|| Arc::new(Catalog::builtin()));

impl Catalog {
    /// Shared builtin catalog, built once per process.
    pub fn builtin_shared() -> Arc<Catalog> {
        BUILTIN.clone()
    }
}

fn reading_tasks() -> Vec<String> {
    [
        "Read 5 pages of any book",
        "Read 10 pages and write down one thought",
        "Pick a new book to read next",
        "Read 15 pages in a single sitting",
        "Share an interesting quote with a friend",
        "Read somewhere new: a park, a cafe",
        "Read before bed instead of scrolling your phone",
        "Find an author you have never read before",
        "Read 20 pages in the morning",
        "Discuss what you read with someone",
        "Read a biography of someone interesting",
        "Take notes while you read today",
        "Read for 30 minutes in silence",
        "Find a book on a topic new to you",
        "Read aloud for 10 minutes",
        "Read an article on a scientific topic",
        "Re-read a favorite chapter from a book",
        "Read a few pages in a foreign language",
        "Visit a library or a bookshop",
        "Read an interview with a favorite author",
        "Read 25 pages without a break",
        "Collect recommendations for new books",
        "Read a review of a book you want",
        "Read poetry for 15 minutes",
        "Swap books with a friend",
        "Read about the life of a great scientist",
        "Read 30 pages over the day",
        "Write a short review of a book you finished",
        "Make a reading list for next month",
        "Read and share the best idea of your day",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn fitness_tasks() -> Vec<String> {
    [
        "Do 10 squats",
        "Walk 5000 steps",
        "Do a 10-minute warm-up",
        "20 push-ups (knees allowed)",
        "Stretch for 15 minutes",
        "Hold a 1-minute plank",
        "Jog or walk briskly for 20 minutes",
        "50 squats over the day",
        "10 minutes of ab work",
        "Climb 10 flights of stairs",
        "Dance to your favorite music for 15 minutes",
        "30 push-ups over the day",
        "Yoga or stretching for 20 minutes",
        "Walk outside for 30 minutes",
        "100 jump-rope skips",
        "15 minutes of strength training",
        "Go for a swim or a cold shower",
        "Ride a bike for 30 minutes",
        "20 minutes of interval training",
        "A mindful 25-minute walk",
        "A bodyweight workout",
        "30 minutes of active games or sport",
        "20 minutes of pilates",
        "100 calf raises",
        "A functional training session",
        "25 minutes of cardio",
        "Flexibility exercises",
        "Active rest outdoors",
        "A full 45-minute workout",
        "Plan your activity for next month",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
