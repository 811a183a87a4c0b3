mod editing_scenarios;
mod holistic_scenarios;
