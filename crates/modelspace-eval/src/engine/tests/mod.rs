mod cycle_detection;
mod inheritance;
mod instances;
