//! Signature cipher extraction and replay
//!
//! The service scrambles the `s` parameter of protected streams with a short
//! sequence of string mutations declared in its player script. The script is
//! scanned for a handful of fixed textual landmarks, each search scoped by the
//! previous one, and the mutation calls are resolved into a [`DecoderProgram`]
//! that is replayed on every signature.

use crate::error::TubeError;
use crate::platform::client::{Headers, Transport};
use moka::future::Cache;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SIGNATURE_CALL_SITE: &str = ".set(\"signature\",";
const SPLIT_CALL: &str = "split(\"\");";
const JOIN_CALL: &str = "join(\"\")";
const HELPER_END: &str = "};";
const PLAYER_PATH_MARKER: &str = "\"js\":\"";

/// Home page used to discover the current player script
pub const HOME_PAGE_URL: &str = "https://www.youtube.com/";

/// Browser identity the home page is requested with
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Primitive string transform used by the player's helper object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutator {
    /// Exchange the first character with the one at `param`
    Swap,
    /// Remove the first `param` characters
    DropPrefix,
    /// Reverse the whole string
    Reverse,
}

impl Mutator {
    /// Classify a helper-object method declaration by the idiom it uses
    pub fn classify(declaration: &str) -> Option<Mutator> {
        if declaration.contains("reverse") {
            Some(Mutator::Reverse)
        } else if declaration.contains("splice") {
            Some(Mutator::DropPrefix)
        } else if declaration.contains("var ") {
            Some(Mutator::Swap)
        } else {
            None
        }
    }

    /// Apply this mutation to a working buffer in place
    pub fn apply(self, chars: &mut Vec<char>, param: usize) {
        match self {
            Mutator::Swap => {
                if param < chars.len() {
                    chars.swap(0, param);
                }
            }
            Mutator::DropPrefix => {
                let cut = param.min(chars.len());
                chars.drain(..cut);
            }
            Mutator::Reverse => chars.reverse(),
        }
    }
}

/// One resolved mutation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStep {
    pub mutator: Mutator,
    pub param: usize,
}

/// Ordered mutation sequence recovered from a player script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderProgram {
    steps: Vec<DecoderStep>,
}

impl DecoderProgram {
    pub fn new(steps: Vec<DecoderStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[DecoderStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Descramble a signature by replaying every step left to right
    pub fn decode(&self, signature: &str) -> String {
        let mut chars: Vec<char> = signature.chars().collect();
        for step in &self.steps {
            step.mutator.apply(&mut chars, step.param);
        }
        chars.into_iter().collect()
    }
}

/// Apply `program` to `signature`
pub fn decode(program: &DecoderProgram, signature: &str) -> String {
    program.decode(signature)
}

/// Scan a player script and recover its signature program
///
/// Fails when the decipher function name, its body or the helper object
/// cannot be located. Calls naming an unknown helper method are dropped.
pub fn extract_program(script: &str) -> Result<DecoderProgram, TubeError> {
    let name = find_decipher_name(script)?;
    debug!("Decipher function: {}", name);

    let (body_start, body) = find_decipher_body(script, name)?;
    let helper = find_helper_name(body)
        .ok_or_else(|| TubeError::ExtractionFailed("split call not found".to_string()))?;
    debug!("Helper object: {}", helper);

    let helper_body = find_helper_body(script, helper)?;
    let aliases = parse_helper_methods(helper_body);
    if aliases.is_empty() {
        warn!("Helper object {} declares no known mutators", helper);
    }

    let steps = parse_calls(body, &aliases);
    info!(
        "Extracted signature program: {} steps (function at offset {})",
        steps.len(),
        body_start
    );
    Ok(DecoderProgram::new(steps))
}

fn find_decipher_name(script: &str) -> Result<&str, TubeError> {
    let start = script
        .find(SIGNATURE_CALL_SITE)
        .map(|pos| pos + SIGNATURE_CALL_SITE.len())
        .ok_or_else(|| TubeError::ExtractionFailed("signature call site not found".to_string()))?;

    let end = script[start..]
        .find('(')
        .map(|pos| start + pos)
        .ok_or_else(|| TubeError::ExtractionFailed("decipher call not found".to_string()))?;

    let name = script[start..end].trim();
    if name.is_empty() {
        return Err(TubeError::ExtractionFailed(
            "empty decipher function name".to_string(),
        ));
    }
    Ok(name)
}

/// Returns the offset of the function and the statements between its opening
/// brace and the `join("")` call.
fn find_decipher_body<'a>(script: &'a str, name: &str) -> Result<(usize, &'a str), TubeError> {
    let declarations = [format!("function {}", name), format!("{}=function", name)];
    let start = declarations
        .iter()
        .find_map(|decl| script.find(decl.as_str()))
        .ok_or_else(|| {
            TubeError::ExtractionFailed(format!("declaration of {} not found", name))
        })?;

    let open = script[start..]
        .find('{')
        .map(|pos| start + pos + 1)
        .ok_or_else(|| TubeError::ExtractionFailed("function body not found".to_string()))?;
    let end = script[open..]
        .find(JOIN_CALL)
        .map(|pos| open + pos)
        .ok_or_else(|| TubeError::ExtractionFailed("join call not found".to_string()))?;

    Ok((start, &script[open..end]))
}

fn find_helper_name(body: &str) -> Option<&str> {
    let start = body.find(SPLIT_CALL)? + SPLIT_CALL.len();
    let rest = &body[start..];
    let end = rest.find('.')?;
    let name = rest[..end].trim();
    (!name.is_empty()).then_some(name)
}

fn find_helper_body<'a>(script: &'a str, helper: &str) -> Result<&'a str, TubeError> {
    let declaration = format!("var {}=", helper);
    let start = script
        .find(&declaration)
        .map(|pos| pos + declaration.len())
        .ok_or_else(|| TubeError::ExtractionFailed(format!("helper {} not found", helper)))?;

    let open = script[start..]
        .find('{')
        .map(|pos| start + pos + 1)
        .ok_or_else(|| TubeError::ExtractionFailed("helper body not found".to_string()))?;
    let end = script[open..]
        .find(HELPER_END)
        .map(|pos| open + pos)
        .ok_or_else(|| TubeError::ExtractionFailed("helper body not terminated".to_string()))?;

    Ok(&script[open..end])
}

/// Map each `alias:function(..){..}` entry to the mutator it implements
fn parse_helper_methods(body: &str) -> HashMap<String, Mutator> {
    let mut aliases = HashMap::new();

    for declaration in body.split("},") {
        let declaration = declaration.trim();
        let Some((alias, _)) = declaration.split_once(':') else {
            continue;
        };
        match Mutator::classify(declaration) {
            Some(mutator) => {
                aliases.insert(alias.trim().to_string(), mutator);
            }
            None => debug!("Unrecognized helper method: {}", alias.trim()),
        }
    }

    aliases
}

fn parse_calls(body: &str, aliases: &HashMap<String, Mutator>) -> Vec<DecoderStep> {
    let mut steps = Vec::new();

    for statement in body.split(';') {
        let statement = statement.trim();
        if statement.is_empty() || statement.contains("split") || statement.contains("return") {
            continue;
        }

        let Some((alias, param)) = parse_call(statement) else {
            warn!("Unparsable cipher statement: {}", statement);
            continue;
        };

        match aliases.get(alias) {
            Some(&mutator) => steps.push(DecoderStep { mutator, param }),
            None => warn!("Unknown mutator: {}", alias),
        }
    }

    steps
}

/// Split `Obj.alias(a,3)` into its alias and numeric argument
fn parse_call(statement: &str) -> Option<(&str, usize)> {
    let dot = statement.find('.')?;
    let open = dot + statement[dot..].find('(')?;
    let alias = statement[dot + 1..open].trim();
    if alias.is_empty() {
        return None;
    }

    let args = &statement[open + 1..];
    let args = args.split(')').next().unwrap_or(args);
    let param = match args.split_once(',') {
        Some((_, raw)) => raw.trim().parse::<usize>().ok()?,
        None => 0,
    };

    Some((alias, param))
}

/// Process-wide, atomically replaceable signature program
#[derive(Default)]
pub struct SignatureDecoder {
    program: RwLock<Option<Arc<DecoderProgram>>>,
}

impl SignatureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current program as a whole
    pub fn publish(&self, program: Arc<DecoderProgram>) {
        *self.program.write() = Some(program);
    }

    /// Current program, if any extraction has succeeded
    pub fn snapshot(&self) -> Option<Arc<DecoderProgram>> {
        self.program.read().clone()
    }

    /// Decode with the current program; `None` when decoding is unavailable
    pub fn decode(&self, signature: &str) -> Option<String> {
        self.snapshot().map(|program| program.decode(signature))
    }
}

/// Discovers the current player script and keeps the shared program fresh
pub struct CipherLoader {
    transport: Arc<dyn Transport>,
    decoder: Arc<SignatureDecoder>,
    programs: Cache<String, Arc<DecoderProgram>>,
}

impl CipherLoader {
    pub fn new(transport: Arc<dyn Transport>, decoder: Arc<SignatureDecoder>) -> Self {
        Self {
            transport,
            decoder,
            programs: Cache::builder()
                .time_to_live(Duration::from_secs(600))
                .max_capacity(16)
                .build(),
        }
    }

    /// Shared decoder this loader publishes into
    pub fn decoder(&self) -> Arc<SignatureDecoder> {
        self.decoder.clone()
    }

    /// Locate the player script URL in the home page
    pub async fn fetch_player_url(&self) -> Result<String, TubeError> {
        let headers: Headers = vec![("User-Agent".to_string(), DESKTOP_USER_AGENT.to_string())];
        let page = self.transport.get(HOME_PAGE_URL, &headers).await?;
        let page = String::from_utf8_lossy(&page);

        player_url_from_page(&page)
            .ok_or_else(|| TubeError::ExtractionFailed("player script URL not found".to_string()))
    }

    /// Fetch the player script, extract its program and publish it
    ///
    /// On failure the previously published program stays in effect.
    pub async fn refresh(&self) -> Result<Arc<DecoderProgram>, TubeError> {
        let player_url = self.fetch_player_url().await?;
        debug!("Player script: {}", player_url);

        if let Some(cached) = self.programs.get(&player_url).await {
            debug!("Signature program cache hit");
            self.decoder.publish(cached.clone());
            return Ok(cached);
        }

        let script = self.transport.get(&player_url, &[]).await?;
        let script: String = String::from_utf8_lossy(&script)
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .collect();

        let program = match extract_program(&script) {
            Ok(program) => Arc::new(program),
            Err(e) => {
                warn!("Keeping previous signature program: {}", e);
                return Err(e);
            }
        };

        self.programs.insert(player_url, program.clone()).await;
        self.decoder.publish(program.clone());
        Ok(program)
    }
}

/// Pull the player script path out of the home page and make it absolute
pub fn player_url_from_page(page: &str) -> Option<String> {
    let start = page.find(PLAYER_PATH_MARKER)? + PLAYER_PATH_MARKER.len();
    let end = start + page[start..].find('"')?;
    let path = page[start..end].replace("\\/", "/");
    if path.is_empty() {
        return None;
    }

    let url = if path.starts_with("http") {
        path
    } else if path.starts_with("//") {
        format!("https:{}", path)
    } else if path.starts_with('/') {
        format!("https://www.youtube.com{}", path)
    } else {
        format!("https://{}", path)
    };
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::client::tests::FakeTransport;

    const PLAYER_JS: &str = concat!(
        "var Xy={ab:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c},",
        "cd:function(a){a.reverse()},",
        "ef:function(a,b){a.splice(0,b)}};",
        "Zq=function(a){a=a.split(\"\");Xy.ab(a,3);Xy.cd(a,45);Xy.ef(a,2);Xy.ab(a,1);return a.join(\"\")};",
        "c&&d.set(\"signature\",Zq(c));"
    );

    fn program(steps: &[(Mutator, usize)]) -> DecoderProgram {
        DecoderProgram::new(
            steps
                .iter()
                .map(|&(mutator, param)| DecoderStep { mutator, param })
                .collect(),
        )
    }

    #[test]
    fn test_extract_program() {
        let program = extract_program(PLAYER_JS).unwrap();
        assert_eq!(
            program.steps(),
            &[
                DecoderStep { mutator: Mutator::Swap, param: 3 },
                DecoderStep { mutator: Mutator::Reverse, param: 45 },
                DecoderStep { mutator: Mutator::DropPrefix, param: 2 },
                DecoderStep { mutator: Mutator::Swap, param: 1 },
            ]
        );
    }

    #[test]
    fn test_extract_program_function_keyword() {
        let script = PLAYER_JS.replace("Zq=function(a)", "function Zq(a)");
        let program = extract_program(&script).unwrap();
        assert_eq!(program.steps().len(), 4);
    }

    #[test]
    fn test_extract_program_drops_unknown_alias() {
        let script = PLAYER_JS.replace("Xy.ef(a,2);", "Xy.zz(a,2);");
        let program = extract_program(&script).unwrap();
        assert_eq!(program.steps().len(), 3);
        assert!(program
            .steps()
            .iter()
            .all(|s| s.mutator != Mutator::DropPrefix));
    }

    #[test]
    fn test_extract_program_missing_landmarks() {
        assert!(matches!(
            extract_program("function foo(a){return a}"),
            Err(TubeError::ExtractionFailed(_))
        ));

        let no_body = "d.set(\"signature\",Zq(c));";
        assert!(extract_program(no_body).is_err());

        let no_helper = PLAYER_JS.replace("var Xy=", "var Qq=");
        assert!(extract_program(&no_helper).is_err());
    }

    #[test]
    fn test_decode_steps() {
        let p = program(&[(Mutator::Reverse, 0)]);
        assert_eq!(decode(&p, "abc123"), "321cba");

        let p = program(&[(Mutator::Swap, 2)]);
        assert_eq!(decode(&p, "abc123"), "cba123");

        let p = program(&[(Mutator::DropPrefix, 2)]);
        assert_eq!(decode(&p, "abc123"), "c123");
    }

    #[test]
    fn test_decode_extracted_program() {
        let program = extract_program(PLAYER_JS).unwrap();
        // swap 3: "dbcaefgh"; reverse: "hgfeacbd"; drop 2: "feacbd"; swap 1: "efacbd"
        assert_eq!(program.decode("abcdefgh"), "efacbd");
        assert_eq!(program.decode("abcdefgh"), program.decode("abcdefgh"));
    }

    #[test]
    fn test_decode_out_of_range_params() {
        let p = program(&[(Mutator::Swap, 99), (Mutator::DropPrefix, 99)]);
        assert_eq!(p.decode("abc"), "");

        let p = program(&[(Mutator::Swap, 99)]);
        assert_eq!(p.decode("abc"), "abc");
        assert_eq!(p.decode(""), "");

        for input in ["", "a", "ab", "abcdef"] {
            let p = program(&[(Mutator::DropPrefix, 4), (Mutator::Swap, 7)]);
            assert!(p.decode(input).len() <= input.len());
        }
    }

    #[test]
    fn test_parse_call() {
        assert_eq!(parse_call("Xy.ab(a,3)"), Some(("ab", 3)));
        assert_eq!(parse_call("Xy.cd(a)"), Some(("cd", 0)));
        assert_eq!(parse_call("Xy.ab(a,b)"), None);
        assert_eq!(parse_call("a=b"), None);
    }

    #[test]
    fn test_signature_decoder_snapshot_swap() {
        let decoder = SignatureDecoder::new();
        assert!(decoder.decode("abc").is_none());

        decoder.publish(Arc::new(program(&[(Mutator::Reverse, 0)])));
        let before = decoder.snapshot().unwrap();

        decoder.publish(Arc::new(program(&[(Mutator::DropPrefix, 1)])));
        assert_eq!(before.decode("abc"), "cba");
        assert_eq!(decoder.decode("abc").as_deref(), Some("bc"));
    }

    #[test]
    fn test_player_url_from_page() {
        let page = r#"..."js":"\/s\/player\/abc\/base.js","css"..."#;
        assert_eq!(
            player_url_from_page(page).as_deref(),
            Some("https://www.youtube.com/s/player/abc/base.js")
        );

        let page = r#""js":"\/\/s.ytimg.com\/yts\/jsbin\/player.js""#;
        assert_eq!(
            player_url_from_page(page).as_deref(),
            Some("https://s.ytimg.com/yts/jsbin/player.js")
        );

        assert!(player_url_from_page("<html></html>").is_none());
    }

    #[tokio::test]
    async fn test_loader_refresh_publishes_program() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(HOME_PAGE_URL, r#"{"js":"\/s\/player\/p1\/base.js"}"#);
        transport.respond(
            "https://www.youtube.com/s/player/p1/base.js",
            &PLAYER_JS.replace(";Xy", ";\nXy"),
        );

        let decoder = Arc::new(SignatureDecoder::new());
        let loader = CipherLoader::new(transport.clone(), decoder.clone());
        let program = loader.refresh().await.unwrap();

        assert_eq!(program.steps().len(), 4);
        assert_eq!(decoder.snapshot().unwrap().steps().len(), 4);

        loader.refresh().await.unwrap();
        assert_eq!(
            transport.request_count("https://www.youtube.com/s/player/p1/base.js"),
            1
        );
    }

    #[tokio::test]
    async fn test_loader_failure_keeps_previous_program() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(HOME_PAGE_URL, r#"{"js":"\/s\/player\/p2\/base.js"}"#);
        transport.respond("https://www.youtube.com/s/player/p2/base.js", "var x=1;");

        let decoder = Arc::new(SignatureDecoder::new());
        decoder.publish(Arc::new(program(&[(Mutator::Reverse, 0)])));

        let loader = CipherLoader::new(transport, decoder.clone());
        assert!(matches!(
            loader.refresh().await,
            Err(TubeError::ExtractionFailed(_))
        ));
        assert_eq!(decoder.decode("ab").as_deref(), Some("ba"));
    }
}
