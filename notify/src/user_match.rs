//! Matching a git committer to a chat user directory entry, so a deploy
//! failure can @mention the person responsible instead of a whole channel.

use std::collections::HashSet;

/// One entry in the chat user directory.
#[derive(Debug, Clone)]
pub struct DirectoryUser {
    pub name: String,
    pub email: String,
    pub real_name: String,
    pub mention: String,
}

/// Jaccard similarity between two character sequences' bigram sets.
fn jaccard_similarity(x: &HashSet<(char, char)>, y: &HashSet<(char, char)>) -> f64 {
    if x.is_empty() && y.is_empty() {
        return 0.0;
    }
    let intersection = x.intersection(y).count();
    let union = x.union(y).count();
    intersection as f64 / union as f64
}

/// Given "William" returns the bigrams [(W,i), (i,l), (l,l), (l,i), (i,a), (a,m)].
fn pairwise_bigrams(s: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 2 {
        return HashSet::new();
    }
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Score a committer's `(name, email)` against one directory entry: the sum
/// of three pairwise-bigram Jaccard similarities, across email, name, and
/// real name.
fn score(committer_name: &str, committer_email: &str, candidate: &DirectoryUser) -> f64 {
    let committer_name = committer_name.to_lowercase();
    let committer_email = committer_email.to_lowercase();

    jaccard_similarity(
        &pairwise_bigrams(&candidate.email.to_lowercase()),
        &pairwise_bigrams(&committer_email),
    ) + jaccard_similarity(
        &pairwise_bigrams(&committer_name),
        &pairwise_bigrams(&candidate.name.to_lowercase()),
    ) + jaccard_similarity(
        &pairwise_bigrams(&committer_name),
        &pairwise_bigrams(&candidate.real_name.to_lowercase()),
    )
}

/// Find the best-matching directory user for a committer. Returns `None`
/// when the best score doesn't clear the 0.5 threshold, or when the
/// directory is empty.
pub fn search<'a>(
    committer_name: &str,
    committer_email: &str,
    directory: &'a [DirectoryUser],
) -> Option<&'a DirectoryUser> {
    directory
        .iter()
        .map(|candidate| (score(committer_name, committer_email, candidate), candidate))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .filter(|(score, _)| *score > 0.5)
        .map(|(_, candidate)| candidate)
}

/// Resolve a committer to a mention string: the matched user's mention if
/// the directory search clears the threshold, else the configured default
/// group mention.
pub fn resolve_mention(
    committer_name: &str,
    committer_email: &str,
    directory: &[DirectoryUser],
    default_group_mention: &str,
) -> String {
    search(committer_name, committer_email, directory)
        .map(|user| user.mention.clone())
        .unwrap_or_else(|| default_group_mention.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, email: &str, real_name: &str, mention: &str) -> DirectoryUser {
        DirectoryUser {
            name: name.to_string(),
            email: email.to_string(),
            real_name: real_name.to_string(),
            mention: mention.to_string(),
        }
    }

    #[test]
    fn matches_close_name_and_email() {
        let directory = vec![
            user("wstokes", "will.stokes@example.com", "william stokes", "<@U1>"),
            user("jbrown", "jane.brown@example.com", "jane brown", "<@U2>"),
        ];
        let matched = search("William Stokes", "will.stokes@example.com", &directory);
        assert_eq!(matched.unwrap().mention, "<@U1>");
    }

    #[test]
    fn falls_back_to_default_group_when_nothing_clears_the_threshold() {
        let directory = vec![user("zzz", "zzz@example.com", "zzz zzz", "<@U9>")];
        let mention = resolve_mention("Alice Smith", "alice@example.com", &directory, "<!subteam^G1|platform>");
        assert_eq!(mention, "<!subteam^G1|platform>");
    }

    #[test]
    fn empty_directory_falls_back() {
        let mention = resolve_mention("Alice Smith", "alice@example.com", &[], "<!subteam^G1|platform>");
        assert_eq!(mention, "<!subteam^G1|platform>");
    }
}
