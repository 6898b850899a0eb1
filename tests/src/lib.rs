//! Integration tests spanning the murk crates.

#[cfg(test)]
mod end_to_end;
#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod ir;
#[cfg(test)]
mod transforms;
