//! Agent profiles.
//!
//! A profile lives at `.ragkit/agents/<name>.yaml` and describes where an
//! agent's records come from, which index holds them and how answers are
//! produced.

use crate::agent::{
    AgentConfig, Generator, RefreshPolicy, RetrievalAgent, DEFAULT_TOP_K, SUBJECT_DOCS,
    SUBJECT_QA, SUBJECT_WEB,
};
use crate::documents::{default_answer_fields, AssemblyMode};
use crate::embeddings::EmbeddingProvider;
use crate::index::{MemoryIndex, SqliteIndex, VectorIndex};
use crate::scrape::{HttpPageFetcher, DEFAULT_MAX_CHARS};
use crate::sources::{DocumentSource, QaFileSource, ScrapeSource, SourceChain, UrlListSource};
use crate::types::UrlEntry;
use ragkit_core::{AppError, AppResult};
use ragkit_llm::LlmClient;
use ragkit_prompt::{loader::RAG_ANSWER, load_prompt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where an agent's records come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Knowledge base JSON file, optionally with labeled URLs
    #[serde(rename_all = "camelCase")]
    Qa {
        path: PathBuf,
        #[serde(default = "default_answer_fields")]
        answer_fields: Vec<String>,
        #[serde(default)]
        mode: AssemblyMode,
        #[serde(default)]
        urls: Vec<UrlEntry>,
    },

    /// Labeled URLs only
    Urls { entries: Vec<UrlEntry> },

    /// Pages fetched and cleaned at build time
    #[serde(rename_all = "camelCase")]
    Scrape {
        urls: Vec<String>,
        #[serde(default = "default_max_chars")]
        max_chars: usize,
    },
}

/// Synthesis token budget for agents whose first source is scraped pages.
pub const SCRAPE_MAX_TOKENS: u32 = 300;

/// Raw-listing preview length for agents whose first source is scraped pages.
pub const SCRAPE_PREVIEW_CHARS: usize = 300;

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

impl SourceSpec {
    /// Subject phrase the answer prompt uses for this kind of source.
    pub fn subject(&self) -> &'static str {
        match self {
            SourceSpec::Qa { .. } => SUBJECT_QA,
            SourceSpec::Urls { .. } => SUBJECT_DOCS,
            SourceSpec::Scrape { .. } => SUBJECT_WEB,
        }
    }

    /// Synthesis token budget when the profile leaves `maxTokens` unset.
    pub fn default_max_tokens(&self) -> Option<u32> {
        match self {
            SourceSpec::Scrape { .. } => Some(SCRAPE_MAX_TOKENS),
            _ => None,
        }
    }

    /// Raw-listing preview length when the profile leaves `previewChars` unset.
    pub fn default_preview_chars(&self) -> Option<usize> {
        match self {
            SourceSpec::Scrape { .. } => Some(SCRAPE_PREVIEW_CHARS),
            _ => None,
        }
    }

    fn into_source(self, workspace: &Path) -> AppResult<Box<dyn DocumentSource>> {
        Ok(match self {
            SourceSpec::Qa {
                path,
                answer_fields,
                mode,
                urls,
            } => Box::new(
                QaFileSource::new(resolve(workspace, &path))
                    .with_answer_fields(answer_fields)
                    .with_mode(mode)
                    .with_urls(urls),
            ),
            SourceSpec::Urls { entries } => Box::new(UrlListSource::new(entries)),
            SourceSpec::Scrape { urls, max_chars } => Box::new(
                ScrapeSource::new(urls, Arc::new(HttpPageFetcher::new()?))
                    .with_max_chars(max_chars),
            ),
        })
    }
}

/// Which index holds an agent's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndexSpec {
    /// Rebuilt on every run
    Memory,

    /// Persisted collection, reused across runs
    Sqlite {
        /// Database file; defaults to `.ragkit/index/<agent>.db`
        #[serde(default)]
        path: Option<PathBuf>,
        /// Collection name; defaults to the agent name
        #[serde(default)]
        collection: Option<String>,
    },
}

impl Default for IndexSpec {
    fn default() -> Self {
        IndexSpec::Sqlite {
            path: None,
            collection: None,
        }
    }
}

/// Generation settings for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides the workspace generation model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Overrides the subject phrase derived from the first source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Agent profile as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    #[serde(default)]
    pub name: String,

    pub sources: Vec<SourceSpec>,

    #[serde(default)]
    pub index: IndexSpec,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_chars: Option<usize>,

    #[serde(default)]
    pub refresh: RefreshPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationSpec>,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Get the path to an agent's profile.
pub fn profile_path(workspace: &Path, name: &str) -> PathBuf {
    workspace
        .join(".ragkit")
        .join("agents")
        .join(format!("{}.yaml", name))
}

/// Default database file for an agent's persisted index.
pub fn default_index_path(workspace: &Path, name: &str) -> PathBuf {
    workspace
        .join(".ragkit")
        .join("index")
        .join(format!("{}.db", name))
}

/// Load an agent profile by name.
pub fn load_profile(workspace: &Path, name: &str) -> AppResult<AgentProfile> {
    let path = profile_path(workspace, name);
    if !path.exists() {
        return Err(AppError::Config(format!(
            "Agent '{}' has no profile at {:?}",
            name, path
        )));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        AppError::Config(format!("Failed to read agent profile at {:?}: {}", path, e))
    })?;

    let mut profile: AgentProfile = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse agent profile at {:?}: {}", path, e))
    })?;

    // File name wins over the name inside the file
    profile.name = name.to_string();
    profile.validate()?;

    tracing::debug!("Loaded agent profile '{}'", name);
    Ok(profile)
}

/// Save an agent profile.
pub fn save_profile(workspace: &Path, profile: &AgentProfile) -> AppResult<()> {
    profile.validate()?;
    let path = profile_path(workspace, &profile.name);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create agents directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(profile)?;
    fs::write(&path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write agent profile to {:?}: {}", path, e))
    })?;

    tracing::debug!("Saved agent profile '{}'", profile.name);
    Ok(())
}

/// Names of all agent profiles in the workspace, sorted.
pub fn list_profiles(workspace: &Path) -> AppResult<Vec<String>> {
    let dir = workspace.join(".ragkit").join("agents");
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("yaml"))
        .filter_map(|e| {
            e.path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect();

    names.sort();
    Ok(names)
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

impl AgentProfile {
    /// Validate the profile.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Config("Agent name cannot be empty".to_string()));
        }

        if self.sources.is_empty() {
            return Err(AppError::Config(format!(
                "Agent '{}' must declare at least one source",
                self.name
            )));
        }

        if self.top_k == 0 {
            return Err(AppError::Config(format!(
                "Agent '{}' has topK 0; it must be at least 1",
                self.name
            )));
        }

        for source in &self.sources {
            if let SourceSpec::Qa { answer_fields, .. } = source {
                if answer_fields.is_empty() {
                    return Err(AppError::Config(format!(
                        "Agent '{}' has a qa source with no answer fields",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether the profile asks for generated answers.
    pub fn generation_enabled(&self) -> bool {
        self.generation.as_ref().is_some_and(|g| g.enabled)
    }

    /// Retrieval settings, with the refresh policy optionally forced to rebuild.
    pub fn agent_config(&self, force_rebuild: bool) -> AgentConfig {
        AgentConfig {
            top_k: self.top_k,
            min_score: self.min_score,
            preview_chars: self.preview_chars.or_else(|| {
                self.sources
                    .first()
                    .and_then(SourceSpec::default_preview_chars)
            }),
            refresh: if force_rebuild {
                RefreshPolicy::Rebuild
            } else {
                self.refresh
            },
        }
    }

    /// Database file and collection of a persisted index, `None` for memory.
    pub fn sqlite_location(&self, workspace: &Path) -> Option<(PathBuf, String)> {
        match &self.index {
            IndexSpec::Memory => None,
            IndexSpec::Sqlite { path, collection } => {
                let db_path = path
                    .as_deref()
                    .map(|p| resolve(workspace, p))
                    .unwrap_or_else(|| default_index_path(workspace, &self.name));
                let collection = collection.clone().unwrap_or_else(|| self.name.clone());
                Some((db_path, collection))
            }
        }
    }

    /// Open the index this profile points at.
    pub fn open_index(&self, workspace: &Path) -> AppResult<Box<dyn VectorIndex>> {
        Ok(match self.sqlite_location(workspace) {
            None => Box::new(MemoryIndex::new()),
            Some((db_path, collection)) => Box::new(SqliteIndex::open(&db_path, collection)?),
        })
    }

    /// Assemble a retrieval agent from this profile.
    ///
    /// `generation` carries the client and the workspace default model; it is
    /// ignored when the profile does not enable generation. A workspace
    /// override of the answer prompt is picked up here.
    pub fn build_agent(
        &self,
        workspace: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        generation: Option<(Arc<dyn LlmClient>, &str)>,
        force_rebuild: bool,
    ) -> AppResult<RetrievalAgent> {
        self.validate()?;

        let subject = self
            .sources
            .first()
            .map(SourceSpec::subject)
            .unwrap_or(SUBJECT_QA);

        let mut sources = self
            .sources
            .iter()
            .cloned()
            .map(|spec| spec.into_source(workspace))
            .collect::<AppResult<Vec<_>>>()?;

        let source: Box<dyn DocumentSource> = if sources.len() == 1 {
            sources.remove(0)
        } else {
            Box::new(SourceChain::new(sources))
        };

        let mut builder = RetrievalAgent::builder(source, embedder, self.open_index(workspace)?)
            .name(&self.name)
            .config(self.agent_config(force_rebuild));

        if let (Some(spec), Some((client, default_model))) = (&self.generation, generation) {
            if spec.enabled {
                let model = spec.model.as_deref().unwrap_or(default_model);
                let mut generator = Generator::new(client, model)
                    .with_prompt(load_prompt(workspace, RAG_ANSWER)?)
                    .with_subject(spec.subject.as_deref().unwrap_or(subject));
                if let Some(temperature) = spec.temperature {
                    generator = generator.with_temperature(temperature);
                }
                let max_tokens = spec
                    .max_tokens
                    .or_else(|| self.sources.first().and_then(SourceSpec::default_max_tokens));
                if let Some(max_tokens) = max_tokens {
                    generator = generator.with_max_tokens(max_tokens);
                }
                builder = builder.generator(generator);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TrigramProvider;
    use crate::tests::support::ScriptedClient;
    use tempfile::TempDir;

    const PROFILE: &str = r#"
name: ignored
sources:
  - kind: qa
    path: data/meddialog.json
    answerFields: [answer_chatgpt, answer_icliniq]
    mode: concat
    urls:
      - description: Morning-after pill guide
        url: https://www.drugs.com/mtm/morning-after.html
  - kind: urls
    entries:
      - description: Emergency contraception info
        url: https://www.drugs.com/condition/postcoital-contraception.html
topK: 2
minScore: 0.3
generation:
  enabled: true
  maxTokens: 300
"#;

    fn write_profile(workspace: &Path, name: &str, body: &str) {
        let path = profile_path(workspace, name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_load_profile() {
        let temp = TempDir::new().unwrap();
        write_profile(temp.path(), "hybrid", PROFILE);

        let profile = load_profile(temp.path(), "hybrid").unwrap();
        assert_eq!(profile.name, "hybrid");
        assert_eq!(profile.top_k, 2);
        assert_eq!(profile.min_score, Some(0.3));
        assert_eq!(profile.refresh, RefreshPolicy::Never);
        assert_eq!(profile.index, IndexSpec::default());
        assert!(profile.generation_enabled());

        match &profile.sources[0] {
            SourceSpec::Qa {
                answer_fields,
                mode,
                urls,
                ..
            } => {
                assert_eq!(answer_fields.len(), 2);
                assert_eq!(*mode, AssemblyMode::Concat);
                assert_eq!(urls.len(), 1);
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_qa_defaults() {
        let profile: AgentProfile = serde_yaml::from_str(
            "name: qa\nsources:\n  - kind: qa\n    path: kb.json\n",
        )
        .unwrap();

        assert_eq!(profile.top_k, 3);
        assert_eq!(
            profile.sources[0],
            SourceSpec::Qa {
                path: PathBuf::from("kb.json"),
                answer_fields: vec!["answer_chatgpt".to_string()],
                mode: AssemblyMode::Single,
                urls: Vec::new(),
            }
        );
        assert!(!profile.generation_enabled());
    }

    #[test]
    fn test_missing_profile() {
        let temp = TempDir::new().unwrap();
        let result = load_profile(temp.path(), "nope");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let temp = TempDir::new().unwrap();
        write_profile(temp.path(), "empty", "sources: []\n");
        assert!(load_profile(temp.path(), "empty").is_err());

        write_profile(
            temp.path(),
            "zero",
            "sources:\n  - kind: urls\n    entries: []\ntopK: 0\n",
        );
        assert!(load_profile(temp.path(), "zero").is_err());
    }

    #[test]
    fn test_save_and_list_profiles() {
        let temp = TempDir::new().unwrap();
        let profile = AgentProfile {
            name: "web".to_string(),
            sources: vec![SourceSpec::Scrape {
                urls: vec!["https://example.org".to_string()],
                max_chars: 1000,
            }],
            index: IndexSpec::Memory,
            top_k: 3,
            min_score: None,
            preview_chars: Some(300),
            refresh: RefreshPolicy::Rebuild,
            generation: None,
        };

        save_profile(temp.path(), &profile).unwrap();
        write_profile(temp.path(), "alpha", "sources:\n  - kind: urls\n    entries: []\n");

        assert_eq!(list_profiles(temp.path()).unwrap(), vec!["alpha", "web"]);
        assert_eq!(load_profile(temp.path(), "web").unwrap(), profile);
    }

    #[test]
    fn test_open_default_sqlite_index() {
        let temp = TempDir::new().unwrap();
        let profile: AgentProfile =
            serde_yaml::from_str("sources:\n  - kind: urls\n    entries: []\n").unwrap();
        let profile = AgentProfile {
            name: "urls".to_string(),
            ..profile
        };

        let index = profile.open_index(temp.path()).unwrap();
        assert_eq!(index.count().unwrap(), 0);
        assert!(default_index_path(temp.path(), "urls").exists());
    }

    #[tokio::test]
    async fn test_build_agent_from_profile() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("data")).unwrap();
        fs::write(
            temp.path().join("data/meddialog.json"),
            r#"[{"input": "Is the i-pill safe?", "answer_chatgpt": "Generally yes.", "answer_icliniq": "Ask a doctor."}]"#,
        )
        .unwrap();
        write_profile(temp.path(), "hybrid", PROFILE);

        let profile = load_profile(temp.path(), "hybrid").unwrap();
        let agent = profile
            .build_agent(temp.path(), Arc::new(TrigramProvider::new(128)), None, false)
            .unwrap();

        assert_eq!(agent.name(), "hybrid");
        assert!(!agent.generation_enabled());
        assert_eq!(agent.ensure_populated().await.unwrap().count(), 3);
        assert_eq!(
            agent.record(0).await.unwrap().unwrap().text,
            "Q: Is the i-pill safe?\nA: Generally yes. | Ask a doctor."
        );
    }

    fn generation_client(client: &Arc<ScriptedClient>) -> Arc<dyn LlmClient> {
        client.clone()
    }

    const SCRAPE_PROFILE: &str = r#"
sources:
  - kind: scrape
    urls: ["http://127.0.0.1:9/unreachable"]
index:
  kind: memory
generation:
  enabled: true
"#;

    #[test]
    fn test_scrape_defaults_for_preview() {
        let scrape: AgentProfile = serde_yaml::from_str(SCRAPE_PROFILE).unwrap();
        assert_eq!(scrape.agent_config(false).preview_chars, Some(300));

        let explicit = AgentProfile {
            preview_chars: Some(80),
            ..scrape
        };
        assert_eq!(explicit.agent_config(false).preview_chars, Some(80));

        let qa: AgentProfile =
            serde_yaml::from_str("sources:\n  - kind: qa\n    path: kb.json\n").unwrap();
        assert_eq!(qa.agent_config(false).preview_chars, None);
    }

    #[tokio::test]
    async fn test_scrape_profile_synthesizes_with_300_tokens() {
        let temp = TempDir::new().unwrap();
        write_profile(temp.path(), "web", SCRAPE_PROFILE);
        let profile = load_profile(temp.path(), "web").unwrap();

        let client = ScriptedClient::new(&["Answer."]);
        let agent = profile
            .build_agent(
                temp.path(),
                Arc::new(TrigramProvider::new(64)),
                Some((generation_client(&client), "gen-model")),
                false,
            )
            .unwrap();

        // The unreachable page still yields a placeholder record
        assert_eq!(agent.ensure_populated().await.unwrap().count(), 1);
        assert_eq!(agent.answer("failed fetch").await.unwrap(), "Answer.");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, Some(SCRAPE_MAX_TOKENS));
        assert!(requests[0].prompt.contains("the retrieved web content"));
    }

    #[tokio::test]
    async fn test_profile_max_tokens_overrides_source_default() {
        let temp = TempDir::new().unwrap();
        let body = format!("{}  maxTokens: 120\n", SCRAPE_PROFILE);
        write_profile(temp.path(), "web", &body);
        let profile = load_profile(temp.path(), "web").unwrap();

        let client = ScriptedClient::new(&["Short."]);
        let agent = profile
            .build_agent(
                temp.path(),
                Arc::new(TrigramProvider::new(64)),
                Some((generation_client(&client), "gen-model")),
                false,
            )
            .unwrap();
        agent.ensure_populated().await.unwrap();
        agent.answer("failed fetch").await.unwrap();

        assert_eq!(client.requests()[0].max_tokens, Some(120));
    }
}
