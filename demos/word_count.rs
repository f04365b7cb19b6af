//! Word frequency counter pipeline
//!
//! Reads lines from stdin, splits them into words with a yielding 1:N
//! process, counts frequencies, and prints the top-N words.
//!
//! Runs on the [`InlineScheduler`], so the whole pipeline executes
//! synchronously inside `send` — no waiting or polling needed.
//!
//! Usage: cargo run --example word_count --release
//!        (Then type lines of text and press Ctrl-D to finish)

use pipeflow::{channel_on, InlineScheduler, Process, ProcessState};
use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead};
use std::sync::Arc;

/// Splits each incoming line into cleaned words, yielding them one by one
struct WordSplitter {
    words: VecDeque<String>,
}

impl WordSplitter {
    fn new() -> Self {
        Self {
            words: VecDeque::new(),
        }
    }
}

impl Process for WordSplitter {
    type Input = String;
    type Output = String;

    fn await_value(&mut self, line: String) {
        for word in line.split_whitespace() {
            let cleaned: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if cleaned.len() > 2 {
                self.words.push_back(cleaned);
            }
        }
    }

    fn yield_value(&mut self) -> String {
        self.words.pop_front().expect("yield without a pending word")
    }

    fn state(&self) -> ProcessState {
        if self.words.is_empty() {
            ProcessState::Await
        } else {
            ProcessState::Yield
        }
    }
}

/// Counts words and periodically prints the running top-10
struct WordCounter {
    counts: HashMap<String, usize>,
    total: usize,
}

impl WordCounter {
    fn new() -> Self {
        Self {
            counts: HashMap::new(),
            total: 0,
        }
    }

    fn top_n(&self, n: usize) -> Vec<(String, usize)> {
        let mut items: Vec<_> = self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        items.sort_by(|a, b| b.1.cmp(&a.1));
        items.into_iter().take(n).collect()
    }
}

impl Process for WordCounter {
    type Input = String;
    type Output = ();

    fn await_value(&mut self, word: String) {
        *self.counts.entry(word).or_insert(0) += 1;
        self.total += 1;

        if self.total % 100 == 0 {
            println!("\n=== Top 10 Words (after {} words) ===", self.total);
            for (i, (word, count)) in self.top_n(10).iter().enumerate() {
                println!("{:2}. {} ({})", i + 1, word, count);
            }
        }
    }

    fn yield_value(&mut self) {}

    fn state(&self) -> ProcessState {
        ProcessState::Await
    }

    fn close(&mut self) {
        println!("\n=== Final Results ===");
        println!("Total words counted: {}", self.total);
        println!("Distinct words: {}", self.counts.len());
        for (i, (word, count)) in self.top_n(10).iter().enumerate() {
            println!("{:2}. {} ({})", i + 1, word, count);
        }
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt().init();

    println!("Word Frequency Counter Pipeline");
    println!("================================");
    println!("Enter lines of text (Ctrl-D to finish):");
    println!();

    let scheduler = Arc::new(InlineScheduler);
    let (tx, rx) = channel_on::<String>(scheduler);
    let words = rx.pipe_process(WordSplitter::new());
    let mut counted = words.pipe_process(WordCounter::new());
    counted.set_ready();
    drop(rx);
    drop(words);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        tx.send(line?);
    }
    drop(tx);

    println!("\nProcessing complete!");
    Ok(())
}
