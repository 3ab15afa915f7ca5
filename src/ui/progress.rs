use crate::ui::theme;
use crate::ui::Icons;
use crossbeam::channel::Sender;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::thread;
use std::time::Duration;

/// Sent by seeding workers, one per tile
#[derive(Clone, Debug)]
pub enum SeedMessage {
    Stored { bytes: usize },
    Failed { tile: String, error: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedTotals {
    pub stored: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Progress bar driven from a channel so any number of workers can report
pub struct SeedProgress {
    bar: ProgressBar,
    handle: thread::JoinHandle<SeedTotals>,
}

impl SeedProgress {
    pub fn new(total: u64) -> (Self, Sender<SeedMessage>) {
        let (tx, rx) = crossbeam::channel::unbounded::<SeedMessage>();

        let bar = if console::Term::stdout().is_term() {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} tiles {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        let bar_clone = bar.clone();
        let handle = thread::spawn(move || {
            let mut totals = SeedTotals::default();
            for msg in rx {
                match msg {
                    SeedMessage::Stored { bytes } => {
                        totals.stored += 1;
                        totals.bytes += bytes as u64;
                    }
                    SeedMessage::Failed { tile, error } => {
                        totals.failed += 1;
                        bar_clone.println(format!("{} {}: {}", Icons::CROSS, tile, error));
                    }
                }
                bar_clone.inc(1);
            }
            totals
        });

        (Self { bar, handle }, tx)
    }

    /// Wait for every sender to be dropped, then print the summary
    pub fn finish(self, elapsed: Duration) -> SeedTotals {
        let totals = self.handle.join().unwrap_or_default();
        self.bar.finish_and_clear();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().ok),
            format!(
                "Seeded {} tile(s), {} failed, in {}",
                totals.stored,
                totals.failed,
                HumanDuration(elapsed)
            )
            .style(theme().ok)
        );
        totals
    }
}
