mod bogus_flow;
mod flatten;
mod pipeline;
mod substitution;
