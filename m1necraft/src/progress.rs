use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use m1necraft_lib::core::ProgressReporter;
use m1necraft_lib::resources::ResourceSynchronizer;
use m1necraft_lib::BundleKind;
use std::time::Duration;
use tokio::task::JoinHandle;

const BAR_LEN: u64 = 1000;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg:<20} [{bar:40.cyan/blue}] {percent:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_LEN as f64).round() as u64
}

/// One bar per resource bundle, fed from the bundle's progress cell
pub struct BundleBars {
    _multi: MultiProgress,
    bars: Vec<(BundleKind, ProgressBar)>,
    feeders: Vec<JoinHandle<()>>,
}

impl BundleBars {
    pub fn attach(resources: &ResourceSynchronizer) -> Self {
        let multi = MultiProgress::new();
        let mut bars = Vec::new();
        let mut feeders = Vec::new();

        for bundle in resources.bundles() {
            let bar = multi.add(ProgressBar::new(BAR_LEN));
            bar.set_style(bar_style());
            bar.set_message(bundle.kind.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));

            let mut rx = bundle.subscribe();
            let feed = bar.clone();
            feeders.push(tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let fraction = *rx.borrow_and_update();
                    feed.set_position(position(fraction));
                }
            }));
            bars.push((bundle.kind, bar));
        }

        Self {
            _multi: multi,
            bars,
            feeders,
        }
    }

    pub fn finish(self, failed: &[BundleKind]) {
        for feeder in &self.feeders {
            feeder.abort();
        }
        for (kind, bar) in self.bars {
            if failed.contains(&kind) {
                bar.abandon_with_message(format!("{kind} (failed)"));
            } else {
                bar.set_position(BAR_LEN);
                bar.finish_with_message(kind.to_string());
            }
        }
    }
}

/// Single download bar usable wherever the engine takes a reporter
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(BAR_LEN);
        bar.set_style(bar_style());
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

impl ProgressReporter for BarReporter {
    fn set_fraction(&self, fraction: f64) {
        self.bar.set_position(position(fraction));
    }

    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }
}

/// Spinner for step-by-step work without a byte count
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message(message.to_string());
    bar
}
