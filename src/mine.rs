use std::fmt;

use alloy_primitives::{Address, B256, keccak256};
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info};

use crate::{address::create2_address_from_hash, error::SearchError, init_code::InitCode};

/// Default cadence of progress events, in attempts.
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;

/// Default number of candidates a parallel search evaluates per batch.
pub const DEFAULT_BATCH_SIZE: u64 = 1 << 16;

/// Number of hex characters in an address.
const ADDRESS_NIBBLES: usize = 40;

/// Returns the salt of the `index`-th candidate: the Keccak-256 hash of the
/// index written as a decimal string.
///
/// Salts are a pure function of the index, so any index range can be
/// re-scanned, resumed or split across workers and always yields the same
/// candidates.
pub fn salt_for_index(index: u64) -> B256 {
    let mut buf = [0u8; 20];
    keccak256(decimal(index, &mut buf))
}

/// Writes `n` in base 10 at the end of `buf` and returns the written digits.
fn decimal(mut n: u64, buf: &mut [u8; 20]) -> &[u8] {
    let mut pos = buf.len();
    loop {
        pos -= 1;
        buf[pos] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break &buf[pos..];
        }
    }
}

/// Decides whether a candidate address is acceptable.
///
/// Predicates run concurrently during parallel searches and must be
/// thread-safe.
pub trait AddressPredicate: Sync {
    fn matches(&self, address: &Address) -> bool;
}

impl<F> AddressPredicate for F
where
    F: Fn(&Address) -> bool + Sync,
{
    fn matches(&self, address: &Address) -> bool {
        self(address)
    }
}

/// Case-insensitive hex prefix an address must start with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexPrefix {
    /// Lowercase prefix without `0x`.
    text: String,
    nibbles: Vec<u8>,
}

impl HexPrefix {
    /// Parses a prefix such as `0x333` or `C0FFEE`. The `0x` is optional.
    pub fn parse(prefix: &str) -> Result<Self, SearchError> {
        let trimmed = prefix
            .strip_prefix("0x")
            .or_else(|| prefix.strip_prefix("0X"))
            .unwrap_or(prefix);

        if trimmed.len() > ADDRESS_NIBBLES {
            return Err(SearchError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "longer than an address (40 hex characters)",
            });
        }

        let nibbles = trimmed
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SearchError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "not a hex string",
            })?;

        Ok(Self {
            text: trimmed.to_ascii_lowercase(),
            nibbles,
        })
    }

    /// Number of hex characters constrained by the prefix.
    pub fn len(&self) -> usize {
        self.nibbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    /// Expected number of attempts before a uniformly random address matches,
    /// `16^len`.
    pub fn expected_attempts(&self) -> f64 {
        16f64.powi(self.nibbles.len() as i32)
    }
}

impl AddressPredicate for HexPrefix {
    fn matches(&self, address: &Address) -> bool {
        self.nibbles.iter().enumerate().all(|(i, &nibble)| {
            let byte = address[i / 2];
            let actual = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            actual == nibble
        })
    }
}

impl fmt::Display for HexPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.text)
    }
}

/// Position of a search in the candidate sequence.
///
/// The state is an explicit value rather than a process-wide counter: it can
/// be persisted and resumed, or split into disjoint shards `[next, end)` that
/// are mined independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchState {
    next: u64,
    end: u64,
}

impl SearchState {
    /// Searches candidates `0..max_attempts`.
    pub fn new(max_attempts: u64) -> Self {
        Self {
            next: 0,
            end: max_attempts,
        }
    }

    /// Searches `max_attempts` candidates starting at `start`.
    ///
    /// Bounds are exclusive `u64`s, so the range must end at or below
    /// `u64::MAX`; a budget that would run past it is rejected instead of
    /// being cut short.
    pub fn starting_at(start: u64, max_attempts: u64) -> Result<Self, SearchError> {
        let end = start
            .checked_add(max_attempts)
            .ok_or(SearchError::RangeOverflow {
                start,
                max_attempts,
            })?;
        Ok(Self { next: start, end })
    }

    /// Searches the half-open shard `[start, end)`.
    pub fn shard(start: u64, end: u64) -> Self {
        Self {
            next: start,
            end: end.max(start),
        }
    }

    /// Index of the next candidate to evaluate.
    pub fn next_index(&self) -> u64 {
        self.next
    }

    /// Exclusive upper bound of the search.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.next >= self.end
    }
}

/// Terminal outcome of one search invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// The lowest-index candidate in the scanned range that matched.
    Found {
        salt: B256,
        address: Address,
        /// Candidate index the salt was generated from.
        index: u64,
        /// Candidates evaluated by this invocation, including the match.
        attempts: u64,
    },
    /// Every candidate in the range was evaluated without a match.
    Exhausted { attempts_tried: u64 },
}

impl SearchResult {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// The matching salt, if any.
    pub fn salt(&self) -> Option<B256> {
        match self {
            Self::Found { salt, .. } => Some(*salt),
            Self::Exhausted { .. } => None,
        }
    }

    /// Candidates evaluated by the invocation that produced this result.
    pub fn attempts(&self) -> u64 {
        match self {
            Self::Found { attempts, .. } => *attempts,
            Self::Exhausted { attempts_tried } => *attempts_tried,
        }
    }
}

/// How candidates are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Execution {
    /// One candidate at a time in increasing index order.
    #[default]
    Sequential,
    /// Batches of candidates evaluated on the rayon thread pool.
    ///
    /// Batches run in index order and the lowest matching index inside a
    /// batch wins, so the result is the same as a sequential search.
    Parallel,
}

/// Mines CREATE2 salts for a fixed factory and init code.
///
/// Candidate `i` uses the salt [`salt_for_index(i)`](salt_for_index); the
/// resulting address is `keccak256(0xff ‖ factory ‖ salt ‖ init_code_hash)[12..]`.
#[derive(Debug, Clone, Copy)]
pub struct Create2Miner {
    /// Address of the factory contract that will perform the CREATE2 deployment
    factory: Address,
    /// Keccak256 hash of the contract's init code
    init_code_hash: B256,
    execution: Execution,
    /// Attempts between progress events; zero disables them.
    progress_every: u64,
    batch_size: u64,
}

impl Create2Miner {
    /// Creates a sequential miner for `init_code` deployed through `factory`.
    pub fn new(factory: Address, init_code: &InitCode) -> Self {
        Self::from_init_code_hash(factory, init_code.hash())
    }

    /// Creates a miner from a precomputed init code hash.
    pub fn from_init_code_hash(factory: Address, init_code_hash: B256) -> Self {
        Self {
            factory,
            init_code_hash,
            execution: Execution::Sequential,
            progress_every: DEFAULT_PROGRESS_EVERY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_progress_every(mut self, progress_every: u64) -> Self {
        self.progress_every = progress_every;
        self
    }

    /// Sets the parallel batch size. Values below one are raised to one.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn init_code_hash(&self) -> B256 {
        self.init_code_hash
    }

    /// Calculates the contract address that would result from deploying with
    /// the given salt.
    pub fn compute_address(&self, salt: &B256) -> Address {
        create2_address_from_hash(self.factory, *salt, self.init_code_hash)
    }

    /// Salt and address of the `index`-th candidate.
    pub fn candidate(&self, index: u64) -> (B256, Address) {
        let salt = salt_for_index(index);
        (salt, self.compute_address(&salt))
    }

    /// Searches the remaining range of `state` for a candidate accepted by
    /// `predicate`.
    ///
    /// Returns on the first match without looking further. On return `state`
    /// points just past the match, or at its end when the range was
    /// exhausted, so calling `mine` again continues the search.
    pub fn mine<P>(&self, predicate: &P, state: &mut SearchState) -> SearchResult
    where
        P: AddressPredicate + ?Sized,
    {
        let first = state.next;
        debug!(
            factory = %self.factory,
            init_code_hash = %self.init_code_hash,
            start = first,
            end = state.end,
            execution = ?self.execution,
            "starting salt search"
        );

        let hit = match self.execution {
            Execution::Sequential => self.scan_sequential(predicate, state),
            Execution::Parallel => self.scan_parallel(predicate, state),
        };

        match hit {
            Some(index) => {
                let (salt, address) = self.candidate(index);
                let attempts = index - first + 1;
                info!(%salt, %address, index, attempts, "found matching salt");
                SearchResult::Found {
                    salt,
                    address,
                    index,
                    attempts,
                }
            }
            None => {
                let attempts_tried = state.next - first;
                info!(attempts_tried, "search range exhausted");
                SearchResult::Exhausted { attempts_tried }
            }
        }
    }

    fn scan_sequential<P>(&self, predicate: &P, state: &mut SearchState) -> Option<u64>
    where
        P: AddressPredicate + ?Sized,
    {
        let first = state.next;
        while state.next < state.end {
            let index = state.next;
            state.next += 1;

            let (_, address) = self.candidate(index);
            if predicate.matches(&address) {
                return Some(index);
            }

            if self.progress_every != 0 && (index - first) % self.progress_every == 0 {
                info!(attempt = index, %address, "searching");
            }
        }
        None
    }

    fn scan_parallel<P>(&self, predicate: &P, state: &mut SearchState) -> Option<u64>
    where
        P: AddressPredicate + ?Sized,
    {
        let first = state.next;
        while state.next < state.end {
            let lo = state.next;
            let hi = lo + (state.end - lo).min(self.batch_size);

            let hit = (lo..hi)
                .into_par_iter()
                .find_first(|&index| predicate.matches(&self.candidate(index).1));
            if let Some(index) = hit {
                state.next = index + 1;
                return Some(index);
            }
            state.next = hi;

            if self.progress_every != 0
                && (lo - first) / self.progress_every != (hi - first) / self.progress_every
            {
                info!(attempt = hi - 1, "searching");
            }
        }
        None
    }
}

/// Searches candidates `0..max_attempts` sequentially for a salt whose
/// CREATE2 address satisfies `predicate`.
pub fn search<P>(
    factory: Address,
    init_code: &InitCode,
    predicate: &P,
    max_attempts: u64,
) -> SearchResult
where
    P: AddressPredicate + ?Sized,
{
    Create2Miner::new(factory, init_code).mine(predicate, &mut SearchState::new(max_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::create2_address,
        test_vectors::{TEST_BYTECODE, TEST_FACTORY},
    };
    use alloy_primitives::{address, b256};

    fn test_init_code() -> InitCode {
        InitCode::new(TEST_BYTECODE.to_vec())
    }

    fn prefix(text: &str) -> HexPrefix {
        HexPrefix::parse(text).unwrap()
    }

    #[test]
    fn salts_hash_the_decimal_index() {
        assert_eq!(
            salt_for_index(0),
            b256!("0x044852b2a670ade5407e78fb2863c51de9fcb96542a07186fe3aeda6bb8a116d")
        );
        assert_eq!(
            salt_for_index(88),
            b256!("0xa3bcf8af6929b66d6da7ee355c48fd1cf926fd090bc75a4dcbf7bd8e365645e3")
        );
        for index in [1, 9, 10, 12345, u64::MAX] {
            assert_eq!(salt_for_index(index), keccak256(index.to_string()));
        }
    }

    #[test]
    fn prefix_parsing() {
        assert_eq!(prefix("0x333").len(), 3);
        assert_eq!(prefix("0XabC").to_string(), "0xabc");
        assert!(prefix("").is_empty());
        assert_eq!(prefix("c4").expected_attempts(), 256.0);

        assert!(HexPrefix::parse("0x33g").is_err());
        assert!(HexPrefix::parse("0x 33").is_err());
        assert!(HexPrefix::parse(&"a".repeat(41)).is_err());
        assert!(HexPrefix::parse(&"a".repeat(40)).is_ok());
    }

    #[test]
    fn prefix_matching_is_case_insensitive() {
        let address = address!("0xc48afaa0c340f733d3a695f4074126607a1b10ce");
        assert!(prefix("c4").matches(&address));
        assert!(prefix("0xC48AF").matches(&address));
        assert!(prefix("").matches(&address));
        assert!(prefix("0xc48afaa0c340f733d3a695f4074126607a1b10ce").matches(&address));
        assert!(!prefix("c5").matches(&address));
        assert!(!prefix("c48ae").matches(&address));
    }

    #[test]
    fn finds_lowest_matching_index() {
        let init_code = test_init_code();

        let found = search(TEST_FACTORY, &init_code, &prefix("0x8f"), 1_000);
        assert_eq!(
            found,
            SearchResult::Found {
                salt: b256!("0xad7c5bef027816a800da1736444fb58a807ef4c9603b7848673f7e3a68eb14a5"),
                address: address!("0x8fffa69fa7d308813e9e4936c0d60a1fb0ef56bb"),
                index: 2,
                attempts: 3,
            }
        );

        let found = search(TEST_FACTORY, &init_code, &prefix("461"), 1_000);
        assert_eq!(
            found,
            SearchResult::Found {
                salt: salt_for_index(150),
                address: address!("0x461e0bf69b74cda9d7b6d0f1ed069b6b71f68f5f"),
                index: 150,
                attempts: 151,
            }
        );
    }

    #[test]
    fn found_addresses_satisfy_the_predicate() {
        let init_code = test_init_code();
        for text in ["0", "a", "00", "fe", "8f"] {
            let predicate = prefix(text);
            let result = search(TEST_FACTORY, &init_code, &predicate, 10_000);
            let SearchResult::Found { salt, address, .. } = result else {
                panic!("no match for {text}");
            };
            assert!(predicate.matches(&address));
            assert_eq!(create2_address(TEST_FACTORY, salt, TEST_BYTECODE), address);
        }
    }

    #[test]
    fn search_is_reproducible() {
        let init_code = test_init_code();
        let first = search(TEST_FACTORY, &init_code, &prefix("00"), 500);
        let second = search(TEST_FACTORY, &init_code, &prefix("00"), 500);
        assert_eq!(first, second);
        assert_eq!(first.salt(), Some(salt_for_index(7)));
    }

    #[test]
    fn exhausts_after_exactly_max_attempts() {
        let init_code = test_init_code();
        for text in ["0xfffff", "0x00000"] {
            assert_eq!(
                search(TEST_FACTORY, &init_code, &prefix(text), 100),
                SearchResult::Exhausted {
                    attempts_tried: 100
                }
            );
        }
        assert_eq!(
            search(TEST_FACTORY, &init_code, &prefix("0"), 0),
            SearchResult::Exhausted { attempts_tried: 0 }
        );
    }

    #[test]
    fn state_resumes_after_a_match() {
        let miner = Create2Miner::new(TEST_FACTORY, &test_init_code());
        let predicate = prefix("c4");
        let mut state = SearchState::new(400);

        let first = miner.mine(&predicate, &mut state);
        assert_eq!(first.salt(), Some(salt_for_index(0)));
        assert_eq!(state.next_index(), 1);

        let second = miner.mine(&predicate, &mut state);
        assert_eq!(
            second,
            SearchResult::Found {
                salt: salt_for_index(88),
                address: address!("0xc40961dcda322505b79ae29b485beff5c474d39a"),
                index: 88,
                attempts: 88,
            }
        );
        assert_eq!(state.next_index(), 89);
        assert_eq!(state.remaining(), 311);
    }

    #[test]
    fn shards_only_scan_their_range() {
        let miner = Create2Miner::new(TEST_FACTORY, &test_init_code());
        let predicate = prefix("c4");

        let mut state = SearchState::shard(1, 88);
        assert_eq!(
            miner.mine(&predicate, &mut state),
            SearchResult::Exhausted { attempts_tried: 87 }
        );
        assert!(state.is_exhausted());

        let mut state = SearchState::starting_at(1, 88).unwrap();
        assert_eq!(miner.mine(&predicate, &mut state).salt(), Some(salt_for_index(88)));
    }

    #[test]
    fn budget_past_the_counter_space_is_rejected() {
        let start = u64::MAX - 5;
        assert_eq!(
            SearchState::starting_at(start, 100),
            Err(SearchError::RangeOverflow {
                start,
                max_attempts: 100
            })
        );

        let state = SearchState::starting_at(start, 5).unwrap();
        assert_eq!(state.remaining(), 5);
        assert_eq!(state.end(), u64::MAX);
    }

    #[test]
    fn parallel_matches_sequential() {
        let sequential = Create2Miner::new(TEST_FACTORY, &test_init_code());
        let parallel = sequential.with_execution(Execution::Parallel).with_batch_size(7);

        for text in ["8f", "461", "00", "c4", "0xfffff"] {
            let predicate = prefix(text);
            let mut a = SearchState::new(400);
            let mut b = SearchState::new(400);
            assert_eq!(
                sequential.mine(&predicate, &mut a),
                parallel.mine(&predicate, &mut b),
                "prefix {text}"
            );
            assert_eq!(a, b);
        }
    }

    #[test]
    fn accepts_closure_predicates() {
        let miner = Create2Miner::new(TEST_FACTORY, &test_init_code());
        let ends_with_zero = |address: &Address| address[19] & 0x0f == 0;
        let result = miner.mine(&ends_with_zero, &mut SearchState::new(1_000));
        let SearchResult::Found { address, .. } = result else {
            panic!("expected a match");
        };
        assert_eq!(address[19] & 0x0f, 0);
    }
}
