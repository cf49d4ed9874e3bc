//! Provider Resolver.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSource {
    TierProviders,
    Native,
    Default,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ResolvedProvider {
    pub provider: String,
    pub source: ProviderSource,
    pub matched_pattern: Option<String>,
}

/// Resolve a model id to a provider.
pub fn resolve(model_id: &str, tier_providers: &HashMap<String, String>) -> ResolvedProvider {
    if let Some(provider) = tier_providers.get(model_id) {
        return ResolvedProvider {
            provider: provider.clone(),
            source: ProviderSource::TierProviders,
            matched_pattern: Some(model_id.to_string()),
        };
    }

    let mut prefix_matches: Vec<(&String, &String)> = tier_providers
        .iter()
        .filter(|(pattern, _)| pattern.ends_with("/*"))
        .collect();
    // Longest prefix wins among multiple glob matches.
    prefix_matches.sort_by_key(|(pattern, _)| std::cmp::Reverse(pattern.len()));
    for (pattern, provider) in prefix_matches {
        let prefix = &pattern[..pattern.len() - 1]; // keep trailing '/'
        if model_id.starts_with(prefix) {
            return ResolvedProvider {
                provider: provider.clone(),
                source: ProviderSource::TierProviders,
                matched_pattern: Some(pattern.clone()),
            };
        }
    }

    if let Some(provider) = tier_providers.get("*") {
        return ResolvedProvider {
            provider: provider.clone(),
            source: ProviderSource::TierProviders,
            matched_pattern: Some("*".to_string()),
        };
    }

    if let Some((prefix, _)) = model_id.split_once('/') {
        return ResolvedProvider {
            provider: prefix.to_string(),
            source: ProviderSource::Native,
            matched_pattern: None,
        };
    }

    ResolvedProvider {
        provider: "default".to_string(),
        source: ProviderSource::Default,
        matched_pattern: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins() {
        let mut map = HashMap::new();
        map.insert("anthropic/opus".to_string(), "custom".to_string());
        let r = resolve("anthropic/opus", &map);
        assert_eq!(r.provider, "custom");
        assert_eq!(r.source, ProviderSource::TierProviders);
    }

    #[test]
    fn prefix_glob_matches() {
        let mut map = HashMap::new();
        map.insert("anthropic/*".to_string(), "anthropic-direct".to_string());
        let r = resolve("anthropic/haiku", &map);
        assert_eq!(r.provider, "anthropic-direct");
        assert_eq!(r.matched_pattern.unwrap(), "anthropic/*");
    }

    #[test]
    fn catch_all_matches_when_present() {
        let mut map = HashMap::new();
        map.insert("*".to_string(), "openrouter".to_string());
        let r = resolve("whatever/model", &map);
        assert_eq!(r.provider, "openrouter");
    }

    #[test]
    fn native_provider_from_prefix() {
        let map = HashMap::new();
        let r = resolve("openai/gpt-4o", &map);
        assert_eq!(r.provider, "openai");
        assert_eq!(r.source, ProviderSource::Native);
    }

    #[test]
    fn default_when_no_slash() {
        let map = HashMap::new();
        let r = resolve("bare-model-name", &map);
        assert_eq!(r.provider, "default");
        assert_eq!(r.source, ProviderSource::Default);
    }

    #[rstest::rstest]
    #[case::openai("openai/gpt-4o", "openai", ProviderSource::Native)]
    #[case::mistral("mistral/large", "mistral", ProviderSource::Native)]
    #[case::bare_name("bare-model-name", "default", ProviderSource::Default)]
    fn falls_back_cleanly_with_empty_tier_providers(#[case] model_id: &str, #[case] expected_provider: &str, #[case] expected_source: ProviderSource) {
        let map = HashMap::new();
        let r = resolve(model_id, &map);
        assert_eq!(r.provider, expected_provider);
        assert_eq!(r.source, expected_source);
    }
}
