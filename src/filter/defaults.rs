//! Fixed phrase lists used by the relevance filter's heuristics.

/// Built-in substrings that always disqualify a candidate, regardless of
/// the user's query. Covers job postings, marketing copy, and generic
/// non-research industry content.
pub const DEFAULT_EXCLUDED: &[&str] = &[
    "apply now",
    "we are hiring",
    "job opening",
    "job posting",
    "career opportunity",
    "submit your resume",
    "equal opportunity employer",
    "terms of service",
    "privacy policy",
    "cookie policy",
    "unsubscribe from this list",
    "click here to unsubscribe",
    "limited time offer",
    "buy now",
    "add to cart",
    "free shipping",
    "discount code",
    "promo code",
    "sponsored content",
    "this post is sponsored",
    "affiliate link",
    "advertisement",
    "about the author",
    "all rights reserved",
    "subscribe to our newsletter",
    "sign up for our newsletter",
    "leave a comment below",
    "share this article",
    "follow us on twitter",
    "follow us on linkedin",
    "follow us on facebook",
    "read more here",
    "continue reading",
    "404 not found",
    "page not found",
    "access denied",
    "log in to continue",
    "please enable javascript",
    "this site uses cookies",
    "webinar registration",
    "register for this webinar",
    "book a demo",
    "schedule a demo",
    "request a quote",
];

/// Phrases indicating marketing/announcement copy rather than research.
pub const MARKETING_PHRASES: &[&str] = &[
    "game changer",
    "revolutionary new",
    "industry-leading",
    "best-in-class",
    "cutting-edge solution",
    "disrupting the industry",
    "unlock the power of",
    "take your business to the next level",
    "our new product",
    "exciting news",
];

/// Title fragments indicating a product announcement.
pub const ANNOUNCEMENT_VERBS: &[&str] = &["announcing", "introducing", "launches", "unveils"];
pub const ANNOUNCEMENT_NOUNS: &[&str] = &["solution", "platform", "service", "tool"];

/// Title fragments indicating a link-aggregator / roundup post.
pub const AGGREGATOR_TITLE_MARKERS: &[&str] =
    &["roundup", "weekly links", "daily links", "news digest", "link collection", "reading list"];

/// Words whose presence in a long abstract signals genuine research content,
/// exempting it from the aggregator heuristic.
pub const RESEARCH_INDICATOR_WORDS: &[&str] = &[
    "method", "methods", "experiment", "experiments", "result", "results", "evaluation",
    "benchmark", "dataset", "hypothesis", "analysis", "ablation", "baseline",
];
