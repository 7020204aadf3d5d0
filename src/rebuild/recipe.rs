use std::collections::BTreeMap;

use super::inspect::WheelProfile;
use crate::build::{BuildRequest, BuildStep};
use crate::config::RebuilderConfig;

pub const STEP_CLONE: &str = "clone";
pub const STEP_FETCH_REFERENCE: &str = "fetch-reference";
pub const STEP_BUILD: &str = "build";
pub const STEP_NORMALIZE: &str = "normalize";
/// A failure here means the rebuilt archive differs from the published one.
pub const STEP_DIFF: &str = "diff";

const GIT_IMAGE: &str = "gcr.io/cloud-builders/git";
const CURL_IMAGE: &str = "gcr.io/cloud-builders/curl";

/// Everything that parameterises one wheel rebuild.
#[derive(Debug, Clone)]
pub struct WheelRecipe<'a> {
    pub filename: &'a str,
    pub url: &'a str,
    /// Scheme-less repository, e.g. `github.com/kjd/idna`.
    pub repo: &'a str,
    pub tag: &'a str,
    pub package_root: &'a str,
    pub profile: &'a WheelProfile,
}

impl WheelRecipe<'_> {
    /// The job submitted to the build executor.
    pub fn build_request(&self, config: &RebuilderConfig) -> BuildRequest {
        let substitutions = BTreeMap::from([
            ("_FILENAME".to_string(), self.filename.to_string()),
            ("_URL".to_string(), self.url.to_string()),
            ("_REPO".to_string(), self.repo.to_string()),
            ("_TAG".to_string(), self.tag.to_string()),
            ("_SETUPTOOLS".to_string(), self.profile.setuptools.clone()),
            ("_WHEEL".to_string(), self.profile.wheel.clone()),
            ("_PACKAGEROOT".to_string(), self.package_root.to_string()),
        ]);

        let build_script = format!(
            "apk add python3 py3-pip git && \
             mkdir env && \
             python3 -m venv env && \
             env/bin/pip3 install setuptools${{_SETUPTOOLS}} wheel${{_WHEEL}} && \
             cd repo/${{_PACKAGEROOT}} && \
             /workspace/env/bin/{python} setup.py build bdist_wheel",
            python = self.profile.python
        );
        let diff_script = "apk add python3 py3-pip libmagic libarchive unzip && \
             env/bin/pip3 install diffoscope && \
             env/bin/diffoscope ${_FILENAME} repo/${_PACKAGEROOT}/dist/${_FILENAME}";

        BuildRequest {
            substitutions,
            steps: vec![
                BuildStep::new(
                    STEP_CLONE,
                    GIT_IMAGE,
                    &["clone", "--branch", "${_TAG}", "--single-branch", "https://${_REPO}", "repo"],
                ),
                BuildStep::new(STEP_FETCH_REFERENCE, CURL_IMAGE, &["--output", "${_FILENAME}", "${_URL}"]),
                BuildStep::shell(STEP_BUILD, config.builder_image.clone(), &build_script),
                BuildStep::new(
                    STEP_NORMALIZE,
                    config.normalizer_image(),
                    &["normalize", "${_FILENAME}", "repo/${_PACKAGEROOT}/dist/${_FILENAME}"],
                ),
                BuildStep::shell(STEP_DIFF, config.builder_image.clone(), diff_script),
            ],
        }
    }

    /// Shell-equivalent commands of the build, recorded verbatim in the
    /// provenance recipe.
    pub fn arguments(&self) -> Vec<String> {
        let python = &self.profile.python;
        vec![
            format!("git clone --branch={} --single-branch {}", self.tag, self.repo),
            format!("{python} -m venv /tmp/env"),
            format!(
                "/tmp/env/bin/pip3 install setuptools{} wheel{}",
                self.profile.setuptools, self.profile.wheel
            ),
            format!("cd {}", self.package_root),
            format!("/tmp/env/bin/{python} setup.py build bdist_wheel"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn profile() -> WheelProfile {
        WheelProfile {
            wheel: "==0.37.0".into(),
            setuptools: "==58.3.0".into(),
            python: "python3.9".into(),
        }
    }

    fn recipe(profile: &WheelProfile) -> WheelRecipe<'_> {
        WheelRecipe {
            filename: "idna-3.3-py3-none-any.whl",
            url: "https://files.example/idna-3.3-py3-none-any.whl",
            repo: "github.com/kjd/idna",
            tag: "v3.3",
            package_root: ".",
            profile,
        }
    }

    #[test]
    fn arguments_reproduce_exact_commands() {
        let profile = profile();
        assert_eq!(
            recipe(&profile).arguments(),
            vec![
                "git clone --branch=v3.3 --single-branch github.com/kjd/idna",
                "python3.9 -m venv /tmp/env",
                "/tmp/env/bin/pip3 install setuptools==58.3.0 wheel==0.37.0",
                "cd .",
                "/tmp/env/bin/python3.9 setup.py build bdist_wheel",
            ]
        );
    }

    #[test]
    fn build_request_has_named_ordered_steps() {
        let profile = profile();
        let config = RebuilderConfig {
            project: "proj".into(),
            ..RebuilderConfig::default()
        };
        let request = recipe(&profile).build_request(&config);
        let ids: Vec<&str> = request.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["clone", "fetch-reference", "build", "normalize", "diff"]);
        assert_eq!(request.substitutions["_TAG"], "v3.3");
        assert_eq!(request.substitutions["_WHEEL"], "==0.37.0");
        assert_eq!(request.steps[3].image, "gcr.io/proj/transfer_metadata");
        assert!(request.steps[2].args[1].ends_with("/workspace/env/bin/python3.9 setup.py build bdist_wheel"));
    }
}
