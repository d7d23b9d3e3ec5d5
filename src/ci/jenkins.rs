//! Jenkins implementation of the CI-server interface.
//!
//! Talks to the Jenkins JSON API (`.../api/json`) anonymously. Shapes are
//! declared for exactly the fields the extractor consumes; Jenkins sends
//! plenty more and serde drops it.

use crate::ci::{BuildParameter, CiServer, FetchedBuild, FetchedCase};
use crate::error::Result;
use crate::http::Client;
use async_trait::async_trait;
use serde::Deserialize;

pub struct JenkinsClient {
    http: Client,
    base_url: String,
}

impl JenkinsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            http: Client::new()?,
            base_url,
        })
    }

    fn build_url(&self, job_name: &str, build_number: i64) -> String {
        format!("{}/job/{job_name}/{build_number}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct BuildList {
    #[serde(rename = "allBuilds", default)]
    all_builds: Vec<BuildRef>,
}

#[derive(Debug, Deserialize)]
struct BuildRef {
    number: i64,
}

#[derive(Debug, Deserialize)]
struct BuildDetail {
    #[serde(default)]
    url: String,
    #[serde(default)]
    actions: Vec<BuildAction>,
    #[serde(default)]
    artifacts: Vec<ArtifactRef>,
}

#[derive(Debug, Deserialize)]
struct BuildAction {
    #[serde(default)]
    parameters: Vec<ActionParameter>,
}

#[derive(Debug, Deserialize)]
struct ActionParameter {
    #[serde(default)]
    name: String,
    /// Jenkins encodes parameter values as strings, booleans or numbers
    /// depending on the parameter type.
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ArtifactRef {
    #[serde(rename = "relativePath", default)]
    relative_path: String,
}

#[derive(Debug, Deserialize)]
struct TestReport {
    #[serde(default)]
    suites: Vec<TestSuite>,
}

#[derive(Debug, Deserialize)]
struct TestSuite {
    #[serde(default)]
    cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
struct TestCase {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(rename = "errorStackTrace", default)]
    error_stack_trace: Option<String>,
}

#[async_trait]
impl CiServer for JenkinsClient {
    async fn list_build_ids(&self, job_name: &str) -> Result<Vec<i64>> {
        let url = format!("{}/job/{job_name}/api/json", self.base_url);
        let response = self
            .http
            .get(&url)
            .query("tree", "allBuilds[number]")
            .send()
            .await?
            .success("list builds")?;
        let list: BuildList = response.json()?;
        Ok(list.all_builds.into_iter().map(|b| b.number).collect())
    }

    async fn fetch_build(&self, job_name: &str, build_number: i64) -> Result<Option<FetchedBuild>> {
        let build_url = self.build_url(job_name, build_number);

        let response = self
            .http
            .get(&format!("{build_url}/api/json"))
            .send()
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        let detail: BuildDetail = response.success("fetch build")?.json()?;

        let report = self
            .http
            .get(&format!("{build_url}/testReport/api/json"))
            .send()
            .await?;
        if report.is_not_found() {
            // Build exists but its result set is gone; nothing to triage.
            return Ok(None);
        }
        let report: TestReport = report.success("fetch test report")?.json()?;

        let parameters = detail
            .actions
            .iter()
            .flat_map(|action| &action.parameters)
            .map(|p| BuildParameter {
                name: p.name.clone(),
                value: match &p.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            })
            .collect();

        let artifacts = detail
            .artifacts
            .iter()
            .filter(|a| !a.relative_path.is_empty())
            .map(|a| format!("{build_url}/artifact/{}", a.relative_path))
            .collect();

        let cases = report
            .suites
            .into_iter()
            .flat_map(|suite| suite.cases)
            .map(|case| FetchedCase {
                name: case.name,
                status: case.status,
                stdout: case.stdout,
                stderr: case.stderr,
                stack_trace: case.error_stack_trace,
            })
            .collect();

        Ok(Some(FetchedBuild {
            url: if detail.url.is_empty() {
                format!("{build_url}/")
            } else {
                detail.url
            },
            parameters,
            artifacts,
            cases,
        }))
    }
}
