use ctaflow::engine::{CandidateOutcome, CandidateTrace, Outcome, RunMetrics};
use ctaflow::{CtaId, RenderOutput, ViewResultVerbose};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(start: CtaId, rendered: &RenderOutput, viewed: &ViewResultVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Chain from CTA {start}"), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Chain ━━━", ansi::GRAY));
    print_chain(rendered, &palette);

    println!("\n{}", palette.paint("━━━ Candidates ━━━", ansi::GRAY));
    if let Some(err) = &viewed.details.payload_error {
        println!("  {}", palette.paint(format!("✗ payload unreadable: {err}"), ansi::RED));
    } else if viewed.details.metrics.candidates.is_empty() {
        println!("{}", palette.dim("  No candidates evaluated"));
    } else {
        for trace in &viewed.details.metrics.candidates {
            println!("  {}", fmt_candidate(trace, &palette));
        }
    }

    println!("\n{}", palette.paint("━━━ Transitions ━━━", ansi::GRAY));
    let states: Vec<&str> = viewed.details.metrics.transitions.iter().map(|s| s.name()).collect();
    if states.is_empty() {
        println!("{}", palette.dim("  (orchestrator did not start)"));
    } else {
        println!("  {}", palette.paint(states.join(" → "), ansi::BLUE));
    }

    println!("\n{}", palette.paint("━━━ Result ━━━", ansi::GRAY));
    print_outcome(viewed, &palette);

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    print_timing(&viewed.details.metrics, viewed, &palette);
    println!();
}

fn print_chain(rendered: &RenderOutput, palette: &ansi::Palette) {
    if !rendered.manual.is_empty() {
        let ids: Vec<String> = rendered.manual.iter().map(|id| id.to_string()).collect();
        println!("  {} {}", palette.dim("manual:"), palette.paint(ids.join(", "), ansi::YELLOW));
    }
    let Some(chain) = &rendered.chain else {
        println!("{}", palette.dim("  No chain embedded"));
        if let Some(stop) = rendered.stop {
            println!("  {} {}", palette.dim("stop:"), palette.paint(stop.describe(), ansi::YELLOW));
        }
        return;
    };
    for (idx, entry) in chain.entries().iter().enumerate() {
        println!(
            "  {} {} {} {}",
            palette.paint(format!("[{idx}]"), ansi::GRAY),
            palette.bold(palette.paint(format!("CTA {}", entry.cta_id), ansi::GREEN)),
            palette.dim("│"),
            palette.paint(
                format!("{:?} {} {:?}", entry.insertion_direction, entry.insertion_position, entry.overflow_policy),
                ansi::YELLOW
            ),
        );
        println!("      {} {}", palette.dim("when:"), palette.paint(&entry.compiled_condition_expr, ansi::CYAN));
    }
    if let Some(stop) = rendered.stop {
        println!("  {} {}", palette.dim("stop:"), palette.dim(stop.describe()));
    }
}

fn fmt_candidate(trace: &CandidateTrace, palette: &ansi::Palette) -> String {
    let verdict = match &trace.outcome {
        CandidateOutcome::Unconditional => palette.paint("✓ unconditional", ansi::GREEN),
        CandidateOutcome::Passed => palette.paint("✓ passed", ansi::GREEN),
        CandidateOutcome::Failed => palette.dim("✗ failed"),
        CandidateOutcome::Fault(err) => palette.paint(format!("✗ fault: {err}"), ansi::RED),
    };
    format!(
        "{} {} {} {}",
        palette.paint(format!("[{}]", trace.index), ansi::GRAY),
        palette.paint(format!("CTA {}", trace.cta_id), ansi::BLUE),
        verdict,
        palette.dim(&trace.expr)
    )
}

fn print_outcome(viewed: &ViewResultVerbose, palette: &ansi::Palette) {
    match &viewed.outcome {
        Outcome::Inserted(insertion) => {
            let label = if insertion.terminal_fallback { " (terminal fallback)" } else { "" };
            println!(
                "  {} {}  {} {}",
                palette.bold(palette.paint(format!("Inserted CTA {}{label}", insertion.entry.cta_id), ansi::GREEN)),
                palette.dim("│"),
                palette.paint(format!("index {}/{}", insertion.chain_index, insertion.chain_length), ansi::YELLOW),
                palette.dim(format!("{:?}", insertion.placement)),
            );
            if let Some(selector) = &viewed.details.metrics.container_selector {
                println!(
                    "      {} {}  {} {}",
                    palette.dim("container:"),
                    palette.paint(selector, ansi::CYAN),
                    palette.dim("│ blocks:"),
                    palette.paint(viewed.details.metrics.element_count.to_string(), ansi::CYAN)
                );
            }
            for notification in &viewed.notifications {
                println!("      {} {}", palette.dim("event:"), palette.paint(notification.name(), ansi::BLUE));
            }
        }
        Outcome::Aborted(reason) => {
            println!("  {}", palette.paint(format!("Nothing inserted: {}", reason.describe()), ansi::YELLOW));
        }
    }
}

fn print_timing(metrics: &RunMetrics, viewed: &ViewResultVerbose, palette: &ansi::Palette) {
    println!(
        "  Total: {}  │  Build: {}  │  Delay: {}  │  Resolve: {}  │  Parse: {}  │  Select: {}  │  Insert: {}",
        palette.paint(format!("{:?}", viewed.elapsed), ansi::GREEN),
        palette.paint(format!("{:?}", metrics.build), ansi::CYAN),
        palette.dim(format!("{:?}", metrics.delay)),
        palette.dim(format!("{:?}", metrics.resolve)),
        palette.dim(format!("{:?}", metrics.parse)),
        palette.dim(format!("{:?}", metrics.select)),
        palette.dim(format!("{:?}", metrics.insert)),
    );
}
