mod exclusion;
mod fixtures;
mod roundtrip;
