//! Demo command handler.
//!
//! Builds an in-memory agent from sample data and answers a fixed set of
//! queries, optionally evaluating it afterwards.

use super::{embedder, generation_client, print_json};
use clap::{Args, ValueEnum};
use ragkit_core::{config::AppConfig, AppResult};
use ragkit_knowledge::agent::{SUBJECT_DOCS, SUBJECT_QA, SUBJECT_WEB};
use ragkit_knowledge::profile::{SCRAPE_MAX_TOKENS, SCRAPE_PREVIEW_CHARS};
use ragkit_knowledge::scrape::HttpPageFetcher;
use ragkit_knowledge::sources::{DocumentSource, QaFileSource, ScrapeSource, UrlListSource};
use ragkit_knowledge::{
    AgentConfig, AssemblyMode, EvaluationSummary, Evaluator, EvaluatorConfig, Generator,
    MemoryIndex, RetrievalAgent, UrlEntry,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const MORNING_AFTER_URL: &str = "https://www.drugs.com/mtm/morning-after.html";
const POSTCOITAL_URL: &str = "https://www.drugs.com/condition/postcoital-contraception.html";
const PLANNED_PARENTHOOD_URL: &str =
    "https://www.plannedparenthood.org/learn/morning-after-pill-emergency-contraception";

const QA_QUERIES: [&str; 3] = [
    "What are the side effects of Unwanted 72?",
    "Is it safe to take the morning after pill multiple times in one month?",
    "How effective is the i-pill compared to regular contraceptive pills?",
];

const URL_QUERIES: [&str; 3] = [
    "What are the side effects of the morning after pill?",
    "Is it safe to use emergency contraception if I have PCOD?",
    "Difference between regular contraceptive pills and i-pill?",
];

const SCRAPE_QUERIES: [&str; 3] = [
    "What are the side effects of the morning after pill?",
    "How long after sex can I take emergency contraception?",
    "Is the morning after pill safe for people with PCOD?",
];

const EVAL_QUERIES: [&str; 2] = [
    "Hi doctor,My girlfriend had morning after pill and got her period a few days later. Then we had sex after 15 days of her periods and I did not ejaculate inside her but still no period. Would she be pregnant?",
    "Hello doctor,I took an I-pill after 48 hours of intercourse. Now I am experiencing brown spotting a week before my periods. Is it a sign of pregnancy?",
];

const EVAL_GOLD: [&str; 2] = [
    "Hi, Welcome to Chat Doctor forum. Considering that her with ChatDoctor.  So, having unprotected sex during this time, even though you ejaculated outside, still the chances of precum inside her vagina remains. Precum contains live sperms and hence there may be a chance that she may get pregnant. So, the best way to rule out pregnancy at present would be to get a serum beta hCG test. If the hCG levels less than 5 ng/dL, that indicates negative result and she is not pregnant. In that case, the deal in menses is due to the morning after pill as it is a side effect. Menses shall resume in next few days and one can wait safely. So, at present please get a serum beta hCG test done.",
    "Hi, Welcome to Chat Doctor forum. As you took an emergency contraceptive pill within 48 hours of intercourse, you can expect around 75 % protection towards pregnancy. The protection rate decreases with a delay in the intake of pill from intercourse. The spotting you had could be due to with ChatDoctor.  So, to be sure, if you miss regular bleeding during your expected date of periods, please go for urine pregnancy test once. For more information consult an obstetrician and gynaecologist online ",
];

/// Which sample agent to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoKind {
    /// Q&A knowledge base, one answer field, similarity threshold 0.3
    Qa,
    /// Labeled drug-information URLs
    Urls,
    /// Scraped web pages
    Scrape,
    /// Q&A knowledge base with concatenated answers plus a URL
    Hybrid,
}

/// Run a built-in demo agent
#[derive(Args, Debug)]
pub struct DemoCommand {
    /// Demo to run
    #[arg(value_enum)]
    pub kind: DemoKind,

    /// Knowledge base JSON file for the qa and hybrid demos
    #[arg(long, default_value = "meddialog.json")]
    pub kb: PathBuf,

    /// Synthesize answers with the generation provider
    #[arg(long)]
    pub llm: bool,

    /// Ask this query instead of the sample queries (repeatable)
    #[arg(short, long)]
    pub query: Vec<String>,

    /// Evaluate the agent over the sample evaluation queries afterwards
    #[arg(long)]
    pub evaluate: bool,

    /// Output evaluation results as JSON
    #[arg(long)]
    pub json: bool,
}

fn labeled(description: &str, url: &str) -> UrlEntry {
    UrlEntry::new(description, url)
}

impl DemoCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing demo command: {:?}", self.kind);

        let kb = if self.kb.is_absolute() {
            self.kb.clone()
        } else {
            config.workspace.join(&self.kb)
        };

        let (source, subject, sample_queries): (Box<dyn DocumentSource>, &str, &[&str]) =
            match self.kind {
                DemoKind::Qa => (
                    Box::new(QaFileSource::new(&kb)) as Box<dyn DocumentSource>,
                    SUBJECT_QA,
                    &QA_QUERIES[..],
                ),
                DemoKind::Urls => (
                    Box::new(UrlListSource::new(vec![
                        labeled("Morning-after pill guide", MORNING_AFTER_URL),
                        labeled("Emergency contraception info", POSTCOITAL_URL),
                        labeled(
                            "Planned Parenthood emergency contraception",
                            PLANNED_PARENTHOOD_URL,
                        ),
                    ])) as Box<dyn DocumentSource>,
                    SUBJECT_DOCS,
                    &URL_QUERIES[..],
                ),
                DemoKind::Scrape => (
                    Box::new(ScrapeSource::new(
                        vec![
                            MORNING_AFTER_URL.to_string(),
                            POSTCOITAL_URL.to_string(),
                            PLANNED_PARENTHOOD_URL.to_string(),
                        ],
                        Arc::new(HttpPageFetcher::new()?),
                    )) as Box<dyn DocumentSource>,
                    SUBJECT_WEB,
                    &SCRAPE_QUERIES[..],
                ),
                DemoKind::Hybrid => (
                    Box::new(
                        QaFileSource::new(&kb)
                            .with_answer_fields(vec![
                                "answer_chatgpt".to_string(),
                                "answer_icliniq".to_string(),
                                "answer_chatdoctor".to_string(),
                            ])
                            .with_mode(AssemblyMode::Concat)
                            .with_urls(vec![labeled("Morning-after pill guide", MORNING_AFTER_URL)]),
                    ) as Box<dyn DocumentSource>,
                    SUBJECT_QA,
                    &URL_QUERIES[..],
                ),
            };

        let agent_config = AgentConfig {
            min_score: (self.kind == DemoKind::Qa).then_some(0.3),
            preview_chars: (self.kind == DemoKind::Scrape).then_some(SCRAPE_PREVIEW_CHARS),
            ..AgentConfig::default()
        };

        let client = if self.llm || self.evaluate {
            Some(generation_client(config)?)
        } else {
            None
        };
        let embedder = embedder(config)?;

        let mut builder =
            RetrievalAgent::builder(source, embedder.clone(), Box::new(MemoryIndex::new()))
                .name(format!("demo-{:?}", self.kind).to_lowercase())
                .config(agent_config);

        if let (true, Some(client)) = (self.llm, &client) {
            let mut generator = Generator::new(client.clone(), &config.model).with_subject(subject);
            if self.kind == DemoKind::Scrape {
                generator = generator.with_max_tokens(SCRAPE_MAX_TOKENS);
            }
            builder = builder.generator(generator);
        }

        let agent = builder.build()?;
        let outcome = agent.ensure_populated().await?;
        tracing::info!("Demo agent holds {} records", outcome.count());

        let queries: Vec<String> = if self.query.is_empty() {
            sample_queries.iter().map(|q| q.to_string()).collect()
        } else {
            self.query.clone()
        };

        for query in &queries {
            println!();
            println!("Query: {}", query);
            println!("{}", agent.answer(query).await?);
            println!("{}", "=".repeat(50));
        }

        if let (true, Some(client)) = (self.evaluate, client) {
            let eval_queries: Vec<String> = EVAL_QUERIES.iter().map(|q| q.to_string()).collect();

            // Gold answers come from the Q&A knowledge base, so only the qa demo uses recall
            let gold: HashMap<String, String> = EVAL_QUERIES
                .iter()
                .zip(EVAL_GOLD)
                .map(|(q, a)| (q.to_string(), a.to_string()))
                .collect();
            let gold = (self.kind == DemoKind::Qa).then_some(&gold);

            let evaluator =
                Evaluator::new(client, &config.model, embedder, EvaluatorConfig::default());
            let results = evaluator.evaluate(&agent, &eval_queries, gold).await?;
            let summary = EvaluationSummary::from_results(&results);

            if self.json {
                return print_json(&serde_json::json!({
                    "results": results,
                    "summary": summary,
                }));
            }

            println!();
            println!("=== Evaluating {} ===", agent.name());
            for result in &results {
                println!("{}", serde_json::to_string(result)?);
            }
        }

        Ok(())
    }
}
