use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use linguaspace::config::Config;
use linguaspace::highlight::{decorate, HighlightAction, HighlightProjector, HighlightState};
use linguaspace::index::WordIndex;
use linguaspace::playback::{AudioSource, SimulatedSource};
use linguaspace::scheduler::TickStats;
use linguaspace::transcript::{find_sentence, Transcript, Word};
use linguaspace::vocabulary::{category_for_color, JsonVocabulary, WordEntry};
use linguaspace::{PlayerEvent, PlayerSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "linguaspace")]
#[command(version, about = "Word-synchronised transcript playback")]
#[command(long_about = "Follow a timed transcript word by word, with sentence looping and a personal vocabulary.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show index statistics, short words and sentences of a transcript
    Inspect {
        transcript: PathBuf,
    },

    /// Resolve playback times to words
    Lookup {
        transcript: PathBuf,

        /// Times in seconds
        #[arg(required = true, allow_negative_numbers = true)]
        times: Vec<f64>,
    },

    /// Play a transcript against a simulated clock, highlighting each word
    Play {
        transcript: PathBuf,

        /// Start position in seconds
        #[arg(long)]
        from: Option<f64>,

        /// Loop the sentence around the current word
        #[arg(long = "loop")]
        looping: bool,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Mark words saved in the vocabulary
        #[arg(long)]
        vocab: bool,
    },

    /// Manage the personal vocabulary
    Vocab {
        #[command(subcommand)]
        action: VocabAction,
    },
}

#[derive(Subcommand)]
enum VocabAction {
    /// List saved words
    List,

    /// Save a word
    Add {
        word: String,

        /// Highlight colour; picks the category
        #[arg(short, long, default_value = "#FFD700")]
        color: String,

        /// Sentence the word was seen in
        #[arg(long)]
        context: Option<String>,
    },

    /// Forget a word
    Remove {
        word: String,
    },

    /// Show totals per category and the date range
    Stats,

    /// Find words or categories containing a query
    Search {
        query: String,
    },

    /// Show the most recently saved words
    Recent {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show words by how often they were saved
    Frequent {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Forget every saved word
    Clear {
        /// Confirm clearing
        #[arg(long)]
        yes: bool,
    },

    /// Write all words as an export document
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge an export document into the vocabulary
    Import {
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    match cli.command {
        Command::Inspect { transcript } => inspect(&transcript, &config),
        Command::Lookup { transcript, times } => lookup(&transcript, &times, &config),
        Command::Play {
            transcript,
            from,
            looping,
            speed,
            vocab,
        } => play(&transcript, from, looping, speed, vocab, &config).await,
        Command::Vocab { action } => vocab(action, &config),
    }
}

fn load_index(path: &Path, config: &Config) -> Result<(Transcript, WordIndex)> {
    let transcript = Transcript::load(path)
        .with_context(|| format!("Failed to load transcript {}", path.display()))?;
    let index = WordIndex::from_words(transcript.words()?, config.index.clone())
        .context("Failed to index transcript")?;
    Ok((transcript, index))
}

fn inspect(path: &Path, config: &Config) -> Result<()> {
    let (transcript, index) = load_index(path, config)?;
    let stats = index.stats();

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  {}", style(path.display()).bold());
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Segments:      {}", transcript.segments.len());
    println!("  Words:         {}", stats.total_words);
    println!(
        "  Short words:   {} ({} common)",
        stats.short_words, stats.common_short_words
    );
    println!("  Avg duration:  {:.3}s", stats.average_duration);
    println!(
        "  Buckets:       {} coarse, {} fine",
        stats.coarse_buckets, stats.fine_buckets
    );

    let short = index.short_words();
    if !short.is_empty() {
        println!();
        println!("  Shortest words:");
        for word in short.iter().take(10) {
            println!(
                "    {:<12} {:>7.3}s - {:>7.3}s  ({}ms)",
                word.text,
                word.start,
                word.end,
                (word.duration() * 1000.0).round()
            );
        }
    }

    let mut sentences = Vec::new();
    for word in index.words() {
        if let Some(sentence) = find_sentence(&transcript, word) {
            if sentences.last() != Some(&sentence) {
                sentences.push(sentence);
            }
        }
    }
    if !sentences.is_empty() {
        println!();
        println!("  Sentences:");
        for sentence in &sentences {
            let text: Vec<&str> = (sentence.start_word_index..=sentence.end_word_index)
                .filter_map(|i| index.word(i))
                .map(|w| w.text.as_str())
                .collect();
            println!(
                "    {:>7.2}s - {:>7.2}s  {}",
                sentence.start,
                sentence.end,
                text.join(" ")
            );
        }
    }
    println!();

    Ok(())
}

fn lookup(path: &Path, times: &[f64], config: &Config) -> Result<()> {
    let (_, index) = load_index(path, config)?;

    for &t in times {
        match index.lookup(t) {
            Some(word) => println!(
                "{:>8.3}s  {}  [{:.3}s - {:.3}s]{}",
                t,
                style(&word.text).bold().cyan(),
                word.start,
                word.end,
                if word.is_short { " short" } else { "" }
            ),
            None => println!("{:>8.3}s  {}", t, style("-").dim()),
        }
    }

    Ok(())
}

async fn play(
    path: &Path,
    from: Option<f64>,
    looping: bool,
    speed: f64,
    use_vocab: bool,
    config: &Config,
) -> Result<()> {
    let (transcript, index) = load_index(path, config)?;
    let words: Vec<Word> = index.words().to_vec();
    let duration = words.iter().map(|w| w.end).fold(0.0, f64::max) + 1.0;

    let vocabulary = match (use_vocab, config.vocabulary_path()) {
        (true, Some(path)) => Some(JsonVocabulary::open(&path)),
        (true, None) => {
            warn!("No vocabulary location available, ignoring --vocab");
            None
        }
        (false, _) => None,
    };

    let source = Arc::new(SimulatedSource::new(duration));
    let session = PlayerSession::start(transcript, source.clone(), config);
    let mut events = session.subscribe();
    session
        .set_playback_rate(speed)
        .await
        .context("Invalid --speed")?;

    let stop = CancellationToken::new();
    let on_interrupt = stop.clone();
    ctrlc::set_handler(move || on_interrupt.cancel()).context("Failed to set Ctrl+C handler")?;

    let progress = ProgressBar::new((duration * 1000.0) as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    if let Some(from) = from {
        session.seek(from).await?;
    }
    if looping {
        session.set_looping(true).await?;
    }
    session.play().await?;
    info!("Playing {} ({:.1}s at {}x)", path.display(), duration, speed);

    let mut highlight = HighlightState::new();
    let mut refresh = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                progress.println("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(PlayerEvent::WordChanged(change)) => {
                    if let HighlightAction::Highlight { index, segment, .. } = highlight.project(&change) {
                        if segment.is_some() {
                            progress.println("");
                        }
                        if let Some(word) = words.iter().find(|w| w.index == index) {
                            progress.set_message(render_word(word, vocabulary.as_ref()));
                            progress.println(format!(
                                "{:>8.3}s  {}",
                                change.time,
                                render_word(word, vocabulary.as_ref())
                            ));
                        }
                    }
                }
                Ok(PlayerEvent::LoopArmed { start, end }) => {
                    progress.println(format!(
                        "{} looping {:.2}s - {:.2}s",
                        style("↻").cyan(),
                        start,
                        end
                    ));
                }
                Ok(PlayerEvent::LoopCleared) => progress.println("Loop cleared"),
                Ok(PlayerEvent::SeekFailed { target, reason }) => {
                    progress.println(format!("{} seek to {:.2}s failed: {}", style("!").yellow(), target, reason));
                }
                Ok(PlayerEvent::Degraded { consecutive_failures }) => {
                    progress.println(format!(
                        "{} time source failing ({} reads)",
                        style("!").yellow(),
                        consecutive_failures
                    ));
                }
                Ok(PlayerEvent::Recovered) => progress.println(format!("{} time source recovered", style("✓").green())),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = refresh.tick() => {
                let position = source.current_time().unwrap_or(0.0);
                progress.set_position((position * 1000.0) as u64);
                if !source.is_playing() && position >= duration {
                    break;
                }
            }
        }
    }

    progress.finish_and_clear();
    let stats = session.shutdown().await?;
    print_summary(&stats);
    Ok(())
}

fn render_word(word: &Word, vocabulary: Option<&JsonVocabulary>) -> String {
    let saved = vocabulary
        .map(|v| decorate(word, v))
        .filter(|decoration| decoration.saved);

    match saved {
        Some(decoration) => format!(
            "{} ({})",
            style(&word.text).bold().yellow(),
            category_for_color(decoration.color.as_deref().unwrap_or_default())
        ),
        None if word.is_short => style(&word.text).bold().magenta().to_string(),
        None => style(&word.text).bold().cyan().to_string(),
    }
}

fn print_summary(stats: &TickStats) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                        Playback Summary                       ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Samples:    {}", stats.samples);
    println!("  Changes:    {}", stats.changes);
    println!("  Skipped:    {}", stats.skipped);
    println!("  Failures:   {}", stats.failures);
    println!();
    println!("  Latency:");
    println!("    Mean:     {:?}", stats.mean_latency);
    println!("    p75:      {:?}", stats.p75_latency);
    println!("    Max:      {:?}", stats.max_latency);
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

fn print_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a WordEntry)>) {
    for (word, entry) in entries {
        println!(
            "{:<20} {:<10} {} ({} seen)",
            style(word).bold(),
            entry.category,
            entry.added_at.format("%Y-%m-%d"),
            entry.occurrences.len()
        );
    }
}

fn vocab(action: VocabAction, config: &Config) -> Result<()> {
    let path = config
        .vocabulary_path()
        .context("No vocabulary location available; set LINGUASPACE_VOCAB_PATH")?;
    let mut vocabulary = JsonVocabulary::open(&path);

    match action {
        VocabAction::List => {
            if vocabulary.is_empty() {
                println!("No saved words in {}", path.display());
            }
            print_entries(vocabulary.entries());
        }
        VocabAction::Stats => {
            let stats = vocabulary.stats();
            println!();
            println!("═══════════════════════════════════════════════════════════════");
            println!("                       Vocabulary Summary                      ");
            println!("═══════════════════════════════════════════════════════════════");
            println!();
            println!("  Words:      {}", stats.total);
            for (category, count) in &stats.categories {
                println!("    {:<10} {}", category, count);
            }
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!(
                    "  Saved:      {} to {}",
                    oldest.format("%Y-%m-%d"),
                    newest.format("%Y-%m-%d")
                );
            }
            println!();
        }
        VocabAction::Search { query } => {
            let found = vocabulary.search(&query);
            if found.is_empty() {
                println!("Nothing matches '{}'", query.trim());
            }
            print_entries(found);
        }
        VocabAction::Recent { limit } => print_entries(vocabulary.recent(limit)),
        VocabAction::Frequent { limit } => {
            for (word, count) in vocabulary.frequency().into_iter().take(limit) {
                println!("{:<20} {}", style(word).bold(), count);
            }
        }
        VocabAction::Clear { yes } => {
            if !yes {
                anyhow::bail!(
                    "Refusing to clear {} words without --yes",
                    vocabulary.len()
                );
            }
            let removed = vocabulary.clear()?;
            println!("{} Cleared {} words", style("✓").green(), removed);
        }
        VocabAction::Add {
            word,
            color,
            context,
        } => {
            if vocabulary.add(&word, &color, context.as_deref())? {
                println!("{} Saved '{}'", style("✓").green(), word.trim());
            } else {
                anyhow::bail!("Cannot save an empty word");
            }
        }
        VocabAction::Remove { word } => {
            if vocabulary.remove(&word)? {
                println!("{} Removed '{}'", style("✓").green(), word.trim());
            } else {
                println!("{} '{}' was not saved", style("!").yellow(), word.trim());
            }
        }
        VocabAction::Export { output } => {
            let exported = vocabulary.export()?;
            match output {
                Some(output) => {
                    std::fs::write(&output, exported)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    println!(
                        "{} Exported {} words to {}",
                        style("✓").green(),
                        vocabulary.len(),
                        output.display()
                    );
                }
                None => println!("{}", exported),
            }
        }
        VocabAction::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let count = vocabulary.import(&contents)?;
            println!(
                "{} Imported {} words ({} total)",
                style("✓").green(),
                count,
                vocabulary.len()
            );
        }
    }

    Ok(())
}
