// Multi-Reasoner Bridge - Prompt Assembler
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Merges a reasoning request and its gated attachments into one
// deterministic, backend-agnostic instruction payload.
// No truncation here: per-file caps are the gate's job, aggregate size
// is the backend's concern.

use crate::gate::GateOutcome;
use crate::request::{Depth, Mode, ReasoningRequest};
use serde::Serialize;

/// Backend families get slightly different guard rails in the preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Agentic CLI running as a subprocess (has tools it must not use)
    Cli,
    /// Plain HTTP model API (has no tools at all)
    Api,
}

const REASONING_PREAMBLE: &str = "You are a reasoning assistant providing a second opinion.

Analyze the input provided and give your perspective. If file contents are attached, analyze them as given.

Be direct and helpful. Skip meta-commentary about what you can or can't do - just answer the question.";

const CLI_GUARD: &str = "
This is a reasoning-only task. Do NOT execute commands, do NOT create, modify, or delete files, and do NOT scan or explore any repository or working directory. Everything you need is in this message.";

const API_GUARD: &str = "
This is a reasoning-only task. Do not ask to run commands, edit files, or browse a repository. Everything you need is in this message.";

const FORMAT_MEMO: &str = "
OUTPUT FORMAT - Structure your response as a memo:

## Summary
[2-3 sentence overview of the core insight]

## Key Assumptions
[Bullet list of assumptions you're making]

## Analysis
[Deep reasoning about the topic - this is the main section]

## Options
[If applicable: different approaches or perspectives]

## Risks
[Potential downsides, blind spots, or concerns]

## Recommendation
[Your synthesized recommendation or conclusion]

## Next Questions
[Questions that would help refine the thinking further]

Keep it concise but deep. Prioritize insight over length.";

const FORMAT_BULLETS: &str = "
OUTPUT FORMAT - Bullet points only:
- Provide your analysis as clear, concise bullet points
- Each bullet should be a distinct insight or observation
- Group related points together
- No headers or sections, just bullets
- Aim for 5-15 bullets depending on complexity";

const FORMAT_QUESTIONS: &str = "
OUTPUT FORMAT - Questions only:
- Generate probing questions that would help think through this topic
- Include questions that challenge assumptions
- Include questions that explore implications
- Include questions that identify unknowns
- Aim for 5-10 high-quality questions
- Just list the questions, no other commentary";

const FORMAT_QUICK: &str = "
OUTPUT FORMAT - Quick response:
- Give a direct, concise answer
- No sections or formatting
- 2-5 sentences max";

pub fn preamble(family: BackendFamily) -> String {
    let guard = match family {
        BackendFamily::Cli => CLI_GUARD,
        BackendFamily::Api => API_GUARD,
    };
    format!("{}\n{}", REASONING_PREAMBLE, guard)
}

pub fn format_instruction(mode: Mode) -> &'static str {
    match mode {
        Mode::Memo => FORMAT_MEMO,
        Mode::Bullets => FORMAT_BULLETS,
        Mode::Questions => FORMAT_QUESTIONS,
        Mode::Quick => FORMAT_QUICK,
    }
}

pub fn depth_hint(depth: Depth) -> &'static str {
    match depth {
        Depth::Low => "REASONING EFFORT - Low: give a fast first take; favour the most important points over completeness.",
        Depth::Medium => "REASONING EFFORT - Medium: weigh the main alternatives and trade-offs before concluding.",
        Depth::High => "REASONING EFFORT - High: think thoroughly; test assumptions, consider second-order effects, and argue against your own conclusion before settling.",
    }
}

/// Build the full prompt: preamble + format + depth hint + input + files (+ skipped-file note)
pub fn assemble(request: &ReasoningRequest, gated: &GateOutcome, family: BackendFamily) -> String {
    let mut prompt = format!(
        "{}\n{}\n\n{}\n\n---\n\nUSER INPUT:\n{}",
        preamble(family),
        format_instruction(request.mode()),
        depth_hint(request.depth()),
        request.input(),
    );

    if !gated.attachments.is_empty() {
        let blocks: Vec<String> = gated
            .attachments
            .iter()
            .map(|a| format!("=== FILE: {} ===\n{}\n=== END FILE ===", a.path, a.contents))
            .collect();
        prompt.push_str("\n\n--- ATTACHED FILES ---\n");
        prompt.push_str(&blocks.join("\n\n"));
        prompt.push_str("\n--- END ATTACHED FILES ---");
    }

    if !gated.rejections.is_empty() {
        let notes: Vec<String> = gated.rejections.iter().map(|r| r.to_string()).collect();
        prompt.push_str(&format!(
            "\n\n(Note: Some files could not be read: {})",
            notes.join("; ")
        ));
    }

    prompt
}

// ============================================================================
// TESTS
// ============================================================================
