/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Development harness: feeds a textual action-list fixture through all
//! three passes and reports the result, so engineers can iterate on an
//! action-list compiler without wiring up a full JIT host. The fixture
//! format below is internal to this binary and carries no stability
//! guarantee.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use armv7m_dynencode::{config::Limits, pass1, pass2, pass3, state::State};
use clap::Parser as ClapParser;

/// Run an action-list fixture through `put`/`link`/`encode` and print the
/// resulting machine code (or the first status that went wrong).
#[derive(ClapParser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// Path to a fixture file (see module docs for the format).
    #[clap(short, long)]
    fixture: PathBuf,
    /// Write the encoded machine code here as raw bytes, in addition to
    /// the hex dump printed to stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,
}

/// One `put()` call parsed out of a fixture's `[put]` block.
struct PutCall {
    start: u32,
    args: Vec<i32>,
}

fn parse_fixture(text: &str) -> Result<(Vec<u32>, Vec<PutCall>)> {
    let mut actionlist = Vec::new();
    let mut puts = Vec::new();
    let mut section = "";

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = match name {
                "actionlist" | "put" => name,
                other => bail!("line {}: unknown fixture section [{other}]", lineno + 1),
            };
            continue;
        }
        match section {
            "actionlist" => {
                let word = parse_int(line)
                    .with_context(|| format!("line {}: bad action word", lineno + 1))?;
                actionlist.push(word as u32);
            }
            "put" => {
                let mut fields = line.split_whitespace();
                let start = fields
                    .next()
                    .with_context(|| format!("line {}: put call needs a start index", lineno + 1))?;
                let start = parse_int(start)
                    .with_context(|| format!("line {}: bad start index", lineno + 1))?
                    as u32;
                let args = fields
                    .map(parse_int)
                    .collect::<Result<Vec<i64>>>()
                    .with_context(|| format!("line {}: bad put argument", lineno + 1))?
                    .into_iter()
                    .map(|n| n as i32)
                    .collect();
                puts.push(PutCall { start, args });
            }
            _ => bail!("line {}: data outside of a [actionlist]/[put] section", lineno + 1),
        }
    }

    Ok((actionlist, puts))
}

fn parse_int(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(i64::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse()?)
    }
}

fn main() -> Result<()> {
    armv7m_dynencode::diag::init_tracing();

    let opts = Opts::parse();
    let text = fs::read_to_string(&opts.fixture)
        .with_context(|| format!("failed to read fixture: {}", opts.fixture.display()))?;
    let (actionlist, puts) = parse_fixture(&text).context("failed to parse fixture")?;

    let mut state = State::new(1, Limits::default());
    state.setup(&actionlist);

    for call in &puts {
        pass1::put(&mut state, call.start, &call.args);
        if let Some(err) = state.status {
            bail!("put(start={}) failed: {err}", call.start);
        }
    }

    let codesize = pass2::link(&mut state).context("link() failed")?;
    let mut buffer = vec![0u8; codesize];
    pass3::encode(&mut state, &mut buffer, |_buf, _cp, _id, _pc_relative| 0)
        .context("encode() failed")?;

    println!("codesize: {codesize} bytes");
    print!("bytes:");
    for b in &buffer {
        print!(" {b:02x}");
    }
    println!();

    if let Some(path) = &opts.output {
        fs::write(path, &buffer)
            .with_context(|| format!("failed to write output: {}", path.display()))?;
    }

    Ok(())
}
